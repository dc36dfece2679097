//! Field directives embedded in a declaration's block comment.
//!
//! Each non-empty, non-divider comment line may carry one directive:
//!
//! ```text
//! /**
//!  * userId :: @params
//!  * token  :: @header(x-auth-token) {trim}
//!  * ----
//!  * filter :: @query {lowercase} {split}
//!  */
//! ```
//!
//! The text before `::` names the target field (dotted, relative to the
//! schema root). `@source(arg1, arg2)` picks the transport; arguments are
//! trimmed and kept as extra params. `{tag}` groups after the separator are
//! captured as pipe tags. Lines with no recognised directive are ignored.

use super::types::{Annotation, FieldPath, InputSource};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\*\*?([\s\S]*?)\*/").expect("block comment regex should be valid")
});

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@(header|query|body|params)(?:\(([^)]*)\))?")
        .expect("directive regex should be valid")
});

static PIPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}]+)\}").expect("pipe regex should be valid"));

/// Extract every annotation from a raw declaration comment.
///
/// Accepts either the full `/** ... */` block or text already stripped of
/// the delimiters.
pub fn parse_annotations(comment: &str) -> Vec<Annotation> {
    let body = match BLOCK_COMMENT.captures(comment) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
        None => comment,
    };

    body.replace('*', "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_divider(line))
        .filter_map(parse_line)
        .collect()
}

fn is_divider(line: &str) -> bool {
    line.starts_with("//") || line.chars().all(|c| matches!(c, '-' | '=' | '_' | '~'))
}

/// Parse one comment line. Returns `None` when the line has no directive.
pub fn parse_line(line: &str) -> Option<Annotation> {
    let caps = DIRECTIVE.captures(line)?;
    let whole = caps.get(0)?;
    let source: InputSource = caps.get(1)?.as_str().parse().ok()?;
    let extra_params: Vec<String> = caps
        .get(2)
        .map(|m| {
            m.as_str()
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let (target, remainder) = match line.split_once("::") {
        Some((target, rest)) => (target.trim(), rest.to_string()),
        None => (line[..whole.start()].trim(), line[whole.end()..].to_string()),
    };
    let remainder = remainder.replacen(whole.as_str(), "", 1);

    let field_path: FieldPath = match target.parse() {
        Ok(path) if !FieldPath::is_empty(&path) => path,
        _ => {
            warn!(line = %line, "Annotation without a target field ignored");
            return None;
        }
    };

    let pipe = PIPE
        .captures_iter(&remainder)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect();

    Some(Annotation {
        field_path,
        source,
        extra_params,
        pipe,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_and_target() {
        let ann = parse_line("userId :: @params").unwrap();
        assert_eq!(ann.field_path.to_string(), "userId");
        assert_eq!(ann.source, InputSource::Params);
        assert!(ann.extra_params.is_empty());
        assert!(ann.pipe.is_empty());
    }

    #[test]
    fn extra_params_are_trimmed() {
        let ann = parse_line("token :: @header( x-auth-token , x-alt )").unwrap();
        assert_eq!(ann.source, InputSource::Header);
        assert_eq!(ann.extra_params, vec!["x-auth-token", "x-alt"]);
    }

    #[test]
    fn pipes_are_captured_after_separator() {
        let ann = parse_line("filter :: @query {lowercase} {split}").unwrap();
        assert_eq!(ann.pipe, vec!["lowercase", "split"]);
    }

    #[test]
    fn line_without_directive_yields_nothing() {
        assert!(parse_line("just a description of the type").is_none());
        assert!(parse_line("name :: @cookie").is_none());
    }

    #[test]
    fn block_comment_skips_dividers_and_blank_lines() {
        let comment = "/**\n * Creates a user\n *\n * ------\n * // email :: @query\n * id :: @params\n * user.name :: @body {trim}\n */";
        let anns = parse_annotations(comment);
        assert_eq!(anns.len(), 2);
        assert_eq!(anns[0].field_path.to_string(), "id");
        assert_eq!(anns[1].field_path.to_string(), "user.name");
        assert_eq!(anns[1].source, InputSource::Body);
        assert_eq!(anns[1].pipe, vec!["trim"]);
    }

    #[test]
    fn target_before_directive_without_separator() {
        let ann = parse_line("limit @query").unwrap();
        assert_eq!(ann.field_path.to_string(), "limit");
        assert_eq!(ann.source, InputSource::Query);
    }
}
