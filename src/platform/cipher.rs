//! Signature cipher resolution
//!
//! The client script signs stream URLs with a small transformation function.
//! Instead of running the script, the function is located by pattern,
//! rewritten into a neutral statement form and classified into
//! [`Operation`]s that [`CipherProgram::evaluate`] applies directly.
//!
//! Translated statements use `@`-prefixed built-ins (`@split`, `@join`,
//! `@len`, `@slice`, `@splice`, `@reverse`). `@` can never start a script
//! identifier, so a built-in can never be confused with a helper.

use crate::error::CipherError;
use crate::platform::program::{CipherProgram, HelperOp, Operation, Step};
use crate::utils::cache::{new_program_cache, CacheConfig, ProgramCache};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Call sites that hand the deciphered signature to the URL builder, tried in order
const ENTRY_POINT_PATTERNS: &[&str] = &[
    r#"\.set\(\w+\.sp,encodeURIComponent\(([$\w]+)"#,
    r#"\.set\(\w+\.sp,\(0,window\.encodeURIComponent\)\(([$\w]+)"#,
    r#"\.set\(\w+\.sp,([$\w]+)\(\w+\.s\)\)"#,
    r#""signature",([$\w]+)\(\w+\.\w+\)"#,
];

/// Array methods left in place by call normalization
const BUILTIN_METHODS: &[&str] = &["split", "join", "reverse", "slice", "splice", "length"];

/// Prefix of the registered entry point name
pub const ENTRY_PREFIX: &str = "main:";
/// Prefix of registered helper names
pub const HELPER_PREFIX: &str = "helper:";

/// Resolve a cipher token against raw client-script text
pub fn resolve_cipher(script: &str, token: &str) -> Result<String, CipherError> {
    CipherEngine::translate(script)?.evaluate(token)
}

/// Signature engine with a translation cache shared across resolutions
#[derive(Clone)]
pub struct CipherEngine {
    cache: ProgramCache,
}

impl CipherEngine {
    pub fn new() -> Self {
        Self::with_cache_config(&CacheConfig::default())
    }

    pub fn with_cache_config(config: &CacheConfig) -> Self {
        Self {
            cache: new_program_cache(config),
        }
    }

    /// Translated program for `script`, computed once per distinct script text
    pub async fn program(&self, script: Arc<str>) -> Result<Arc<CipherProgram>, CipherError> {
        let source = script.clone();
        self.cache
            .try_get_with(script, async move { Self::translate(&source).map(Arc::new) })
            .await
            .map_err(|e: Arc<CipherError>| (*e).clone())
    }

    /// Decipher `token` with the program embedded in `script`
    pub async fn decipher(&self, script: Arc<str>, token: &str) -> Result<String, CipherError> {
        let program = self.program(script).await?;
        program.evaluate(token)
    }

    /// Number of translated scripts currently cached
    pub fn cached_programs(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Locate, extract and translate the signature program of `script`
    pub fn translate(script: &str) -> Result<CipherProgram, CipherError> {
        let script = script.replace('\n', " ");

        let name = find_entry_point(&script)?;
        let (param, body) = extract_function(&script, &name)?;
        let body = normalize_calls(&body)?;
        let statements = translate_body(&body)?;
        debug!("Signature function {} translated to {:?}", name, statements);

        let mut steps = Vec::with_capacity(statements.len());
        let mut helpers = HashMap::new();
        for statement in &statements {
            let Some(step) = classify_entry_statement(statement, &param)? else {
                continue;
            };
            if let Step::Call { helper, .. } = &step {
                if !helpers.contains_key(helper) {
                    let helper_name = &helper[HELPER_PREFIX.len()..];
                    let op = resolve_helper(&script, helper_name)?;
                    debug!("Helper {} resolved to {:?}", helper_name, op);
                    helpers.insert(helper.clone(), op);
                }
            }
            steps.push(step);
        }

        CipherProgram::new(format!("{}{}", ENTRY_PREFIX, name), steps, helpers)
    }
}

impl Default for CipherEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn find_entry_point(script: &str) -> Result<String, CipherError> {
    for (index, pattern) in ENTRY_POINT_PATTERNS.iter().enumerate() {
        debug!("Trying entry point pattern {}: {}", index + 1, pattern);
        let regex = Regex::new(pattern)?;
        if let Some(name) = regex.captures(script).and_then(|c| c.get(1)) {
            debug!("Found signature function name: {}", name.as_str());
            return Ok(name.as_str().to_string());
        }
    }
    Err(CipherError::EntryPointNotFound)
}

/// Parameter name and brace-free body of the function `name`
fn extract_function(script: &str, name: &str) -> Result<(String, String), CipherError> {
    let escaped = regex::escape(name);
    let patterns = [
        format!(r#"function {}\((\w+)\)\{{([^\{{\}}]+)\}}"#, escaped),
        format!(r#"(?:^|[^$\w]){}=function\((\w+)\)\{{([^\{{\}}]+)\}}"#, escaped),
    ];
    for pattern in &patterns {
        let regex = Regex::new(pattern)?;
        if let Some(captures) = regex.captures(script) {
            return Ok((captures[1].to_string(), captures[2].to_string()));
        }
    }
    Err(CipherError::EntryBodyNotFound(name.to_string()))
}

/// Rewrite `obj.method(a,N)` and `obj.method(a)` to `method(a,N)` / `method(a)`
fn normalize_calls(body: &str) -> Result<String, CipherError> {
    let regex = Regex::new(r#"([$\w]+)\.([$\w]+)\((\w+(?:,\d+)?)\)"#)?;
    let normalized = regex.replace_all(body, |caps: &Captures| {
        if BUILTIN_METHODS.contains(&&caps[2]) {
            caps[0].to_string()
        } else {
            format!("{}({})", &caps[2], &caps[3])
        }
    });
    Ok(normalized.into_owned())
}

/// Apply the textual rewrites and split the result into statements
fn translate_body(body: &str) -> Result<Vec<String>, CipherError> {
    let rewrites: &[(&str, &str)] = &[
        (r#"([$\w]+)\.split\((?:""|'')\)"#, "@split(${1})"),
        (r#"([$\w]+)\.join\((?:""|'')\)"#, "@join(${1})"),
        (r#"([$\w]+)\.reverse\(\)"#, "@reverse(${1})"),
        (r#"([$\w]+)\.slice\((\w+)\)"#, "@slice(${1},${2})"),
        (r#"([$\w]+)\.splice\((\w+),(\w+)\)"#, "@splice(${1},${2},${3})"),
        (r#"([$\w]+)\.length"#, "@len(${1})"),
        (r#"\bvar\s+"#, ""),
        (r#"[\{\}]"#, ";"),
    ];

    let mut text = body.to_string();
    for (pattern, replacement) in rewrites {
        let regex = Regex::new(pattern)?;
        text = regex.replace_all(&text, *replacement).into_owned();
    }

    Ok(text
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_arg(statement: &str, value: Option<regex::Match<'_>>) -> Result<usize, CipherError> {
    match value {
        Some(m) => m
            .as_str()
            .parse()
            .map_err(|_| CipherError::Untranslatable(statement.to_string())),
        None => Ok(0),
    }
}

/// `None` for `@split`, which only turns the token into the array evaluation starts from
fn classify_entry_statement(statement: &str, param: &str) -> Result<Option<Step>, CipherError> {
    let p = regex::escape(param);

    if Regex::new(&format!(r#"^(?:{p}=)?@split\({p}\)$"#))?.is_match(statement) {
        return Ok(None);
    }
    if Regex::new(&format!(r#"^return @join\({p}\)$"#))?.is_match(statement) {
        return Ok(Some(Step::Builtin(Operation::Join)));
    }
    if Regex::new(&format!(r#"^(?:{p}=)?@reverse\({p}\)$"#))?.is_match(statement) {
        return Ok(Some(Step::Builtin(Operation::Reverse)));
    }
    if let Some(c) =
        Regex::new(&format!(r#"^(?:{p}=)?@slice\({p},(\d+)\)$"#))?.captures(statement)
    {
        return Ok(Some(Step::Builtin(Operation::Slice(parse_arg(statement, c.get(1))?))));
    }
    if let Some(c) =
        Regex::new(&format!(r#"^(?:{p}=)?@splice\({p},(\d+),(\d+)\)$"#))?.captures(statement)
    {
        return Ok(Some(Step::Builtin(Operation::Splice {
            index: parse_arg(statement, c.get(1))?,
            count: parse_arg(statement, c.get(2))?,
        })));
    }
    if let Some(c) =
        Regex::new(&format!(r#"^(?:{p}=)?([$\w]+)\({p}(?:,(\d+))?\)$"#))?.captures(statement)
    {
        return Ok(Some(Step::Call {
            helper: format!("{}{}", HELPER_PREFIX, &c[1]),
            arg: parse_arg(statement, c.get(2))?,
        }));
    }

    Err(CipherError::Untranslatable(statement.to_string()))
}

/// Find the object-literal member `name:function(..){..}` and classify its body
fn resolve_helper(script: &str, name: &str) -> Result<HelperOp, CipherError> {
    let escaped = regex::escape(name);
    let two_args = Regex::new(&format!(
        r#"(?:^|[^$\w]){}:function\((\w+),(\w+)\)\{{([^\{{\}}]+)\}}"#,
        escaped
    ))?;
    let one_arg = Regex::new(&format!(
        r#"(?:^|[^$\w]){}:function\((\w+)\)\{{([^\{{\}}]+)\}}"#,
        escaped
    ))?;

    let (array, arg, body) = if let Some(c) = two_args.captures(script) {
        (c[1].to_string(), Some(c[2].to_string()), c[3].to_string())
    } else if let Some(c) = one_arg.captures(script) {
        (c[1].to_string(), None, c[2].to_string())
    } else {
        return Err(CipherError::HelperNotFound(name.to_string()));
    };

    let statements = translate_body(&body)?;
    classify_helper(&statements, &array, arg.as_deref())?
        .ok_or_else(|| CipherError::HelperNotFound(name.to_string()))
}

fn matches<'s>(pattern: &str, statement: &'s str) -> Result<Option<Captures<'s>>, CipherError> {
    Ok(Regex::new(pattern)?.captures(statement))
}

fn classify_helper(
    statements: &[String],
    array: &str,
    arg: Option<&str>,
) -> Result<Option<HelperOp>, CipherError> {
    let a = regex::escape(array);

    match statements {
        [only] => {
            if matches(&format!(r#"^(?:{a}=)?@reverse\({a}\)$"#), only)?.is_some() {
                return Ok(Some(HelperOp::Reverse));
            }
            let Some(arg) = arg else {
                return Ok(None);
            };
            let b = regex::escape(arg);
            let splice = format!(r#"^(?:{a}=)?@splice\({a},(\d+),{b}\)$"#);
            if let Some(c) = matches(&splice, only)? {
                return Ok(c[1].parse().ok().map(|index| HelperOp::Splice { index }));
            }
            if matches(&format!(r#"^(?:return |{a}=)?@slice\({a},{b}\)$"#), only)?.is_some() {
                return Ok(Some(HelperOp::Slice));
            }
            Ok(None)
        }
        [first, second, third] => {
            let Some(arg) = arg else {
                return Ok(None);
            };
            let b = regex::escape(arg);
            let Some(tmp) = matches(&format!(r#"^([$\w]+)={a}\[0\]$"#), first)? else {
                return Ok(None);
            };
            let tmp = regex::escape(&tmp[1]);
            let index = format!(r#"{b}(?:%@len\({a}\))?"#);
            let swapped = matches(&format!(r#"^{a}\[0\]={a}\[{index}\]$"#), second)?.is_some()
                && matches(&format!(r#"^{a}\[{index}\]={tmp}$"#), third)?.is_some();
            Ok(swapped.then_some(HelperOp::Swap))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVERSE_ONLY: &str = r#"var Xy={rv:function(a){a.reverse()}};function Ab(a){a=a.split("");Xy.rv(a,1);return a.join("")};c.set(b.sp,encodeURIComponent(Ab(c.s)))"#;

    const FULL_PLAYER: &str = r#"var Qk={
Vx:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c},
Hm:function(a){a.reverse()},
pQ:function(a,b){a.splice(0,b)}};
Rt=function(a){a=a.split("");Qk.pQ(a,2);Qk.Vx(a,3);Qk.Hm(a,14);Qk.Vx(a,1);return a.join("")};
d.set(e.sp,(0,window.encodeURIComponent)(Rt(e.s)));"#;

    #[test]
    fn test_reverse_only_program() {
        assert_eq!(resolve_cipher(REVERSE_ONLY, "abc").unwrap(), "cba");
    }

    #[test]
    fn test_full_program_translation() {
        let program = CipherEngine::translate(FULL_PLAYER).unwrap();
        assert_eq!(program.entry(), "main:Rt");
        assert_eq!(
            program.operations(),
            &[
                Operation::Splice { index: 0, count: 2 },
                Operation::Swap(3),
                Operation::Reverse,
                Operation::Swap(1),
                Operation::Join,
            ]
        );
        assert_eq!(program.helpers().get("helper:Vx"), Some(&HelperOp::Swap));
        assert_eq!(program.helpers().get("helper:Hm"), Some(&HelperOp::Reverse));
        assert_eq!(
            program.helpers().get("helper:pQ"),
            Some(&HelperOp::Splice { index: 0 })
        );
    }

    #[test]
    fn test_full_program_evaluation() {
        // "abcdefgh" -> splice(0,2) "cdefgh" -> swap(3) "fdecgh"
        // -> reverse "hgcedf" -> swap(1) "ghcedf"
        assert_eq!(resolve_cipher(FULL_PLAYER, "abcdefgh").unwrap(), "ghcedf");
    }

    #[test]
    fn test_translation_is_deterministic() {
        let a = CipherEngine::translate(FULL_PLAYER).unwrap();
        let b = CipherEngine::translate(FULL_PLAYER).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_entry_point() {
        let err = resolve_cipher("function x(a){return a}", "abc").unwrap_err();
        assert_eq!(err, CipherError::EntryPointNotFound);
    }

    #[test]
    fn test_entry_body_missing() {
        let err = resolve_cipher("c.set(b.sp,encodeURIComponent(Zz(c.s)))", "abc").unwrap_err();
        assert!(matches!(err, CipherError::EntryBodyNotFound(_)));
    }

    #[test]
    fn test_missing_helper_is_hard_failure() {
        let script = r#"function Ab(a){a=a.split("");Nope.zz(a,3);return a.join("")};c.set(b.sp,encodeURIComponent(Ab(c.s)))"#;
        let err = resolve_cipher(script, "abc").unwrap_err();
        assert_eq!(err, CipherError::HelperNotFound("zz".to_string()));
    }

    #[test]
    fn test_untranslatable_statement() {
        let script = r#"function Ab(a){a=a.split("");a=a.map(f);return a.join("")};c.set(b.sp,encodeURIComponent(Ab(c.s)))"#;
        let err = resolve_cipher(script, "abc").unwrap_err();
        assert!(matches!(err, CipherError::Untranslatable(_)));
    }

    #[test]
    fn test_signature_call_site_pattern() {
        let script = r#"var Xy={rv:function(a){a.reverse()}};function Ab(a){a=a.split("");Xy.rv(a,0);return a.join("")};f.set("signature",Ab(g.s));"#;
        assert_eq!(resolve_cipher(script, "xyz").unwrap(), "zyx");
    }

    #[test]
    fn test_inline_builtins_in_entry() {
        let script = r#"function Ab(a){a=a.split("");a=a.slice(1);a.reverse();return a.join("")};c.set(b.sp,encodeURIComponent(Ab(c.s)))"#;
        assert_eq!(resolve_cipher(script, "abcd").unwrap(), "dcb");
    }

    #[test]
    fn test_normalize_keeps_builtins() {
        let body = r#"a=a.split("");Xy.rv(a,1);a.splice(0,2);return a.join("")"#;
        assert_eq!(
            normalize_calls(body).unwrap(),
            r#"a=a.split("");rv(a,1);a.splice(0,2);return a.join("")"#
        );
    }

    #[test]
    fn test_classify_helper_bodies() {
        let swap = translate_body("var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c").unwrap();
        assert_eq!(classify_helper(&swap, "a", Some("b")).unwrap(), Some(HelperOp::Swap));

        let reverse = translate_body("a.reverse()").unwrap();
        assert_eq!(classify_helper(&reverse, "a", None).unwrap(), Some(HelperOp::Reverse));

        let unknown = translate_body("a.push(b)").unwrap();
        assert_eq!(classify_helper(&unknown, "a", Some("b")).unwrap(), None);
    }

    #[test]
    fn test_bad_helper_pattern_is_reported() {
        let err = matches("(unclosed", "a").unwrap_err();
        assert!(matches!(err, CipherError::Pattern(_)));
    }

    #[tokio::test]
    async fn test_engine_caches_translation() {
        let engine = CipherEngine::new();
        let script: Arc<str> = Arc::from(REVERSE_ONLY);

        assert_eq!(engine.decipher(script.clone(), "abc").await.unwrap(), "cba");
        let first = engine.program(script.clone()).await.unwrap();
        let second = engine.program(script).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_engine_reports_failure_without_caching() {
        let engine = CipherEngine::new();
        let script: Arc<str> = Arc::from("no cipher here");
        let err = engine.decipher(script, "abc").await.unwrap_err();
        assert_eq!(err, CipherError::EntryPointNotFound);
    }
}
