//! Static syntax validation for generated Python.
//!
//! Parses with tree-sitter and reports the first ERROR or MISSING node.
//! Nothing is executed. The grammar still accepts some Python 2 forms
//! (`print`/`exec` statements, `async` as a name, bare walrus statements),
//! so a clean tree gets a second pass that rejects what Python 3 refuses.

use serde::Serialize;
use tree_sitter::{Language, Node, Parser};

/// Result of a syntax check. `detail` is `"Valid syntax"` on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxVerdict {
    pub valid: bool,
    pub detail: String,
}

impl SyntaxVerdict {
    fn ok() -> Self {
        Self {
            valid: true,
            detail: "Valid syntax".to_string(),
        }
    }

    fn syntax_error(reason: &str, line: Option<usize>) -> Self {
        let detail = match line {
            Some(n) => format!("SyntaxError: {reason} at line {n}"),
            None => format!("SyntaxError: {reason}"),
        };
        Self {
            valid: false,
            detail,
        }
    }

    fn validation_error(description: &str) -> Self {
        Self {
            valid: false,
            detail: format!("Validation Error: {description}"),
        }
    }
}

/// Check whether `code` parses as a complete Python module.
pub fn check(code: &str) -> SyntaxVerdict {
    let language: Language = tree_sitter_python::LANGUAGE.into();
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&language) {
        return SyntaxVerdict::validation_error(&format!("failed to load Python grammar: {e}"));
    }

    let Some(tree) = parser.parse(code, None) else {
        return SyntaxVerdict::validation_error("parser returned no tree");
    };

    let root = tree.root_node();
    if !root.has_error() {
        return match first_python2_construct(root, code.as_bytes()) {
            Some((reason, line)) => SyntaxVerdict::syntax_error(&reason, Some(line)),
            None => SyntaxVerdict::ok(),
        };
    }

    match first_error(root) {
        Some(node) if node.is_missing() => SyntaxVerdict::syntax_error(
            &format!("expected '{}'", node.kind()),
            Some(node.start_position().row + 1),
        ),
        Some(node) => {
            SyntaxVerdict::syntax_error("invalid syntax", Some(node.start_position().row + 1))
        }
        None => SyntaxVerdict::syntax_error("invalid syntax", None),
    }
}

/// Pre-order walk for the first ERROR/MISSING node, skipping clean subtrees.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

/// Reserved in Python 3; the grammar lets `async`/`await` through as names.
const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Full pre-order walk of a clean tree for nodes Python 3 rejects.
fn first_python2_construct(root: Node<'_>, source: &[u8]) -> Option<(String, usize)> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if let Some(reason) = rejected(node, source) {
            return Some((reason, node.start_position().row + 1));
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

fn rejected(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "print_statement" => Some("Missing parentheses in call to 'print'".to_string()),
        "exec_statement" => Some("Missing parentheses in call to 'exec'".to_string()),
        "named_expression" => {
            let parent = node.parent()?.kind();
            matches!(
                parent,
                "expression_statement" | "assignment" | "augmented_assignment"
            )
            .then(|| "invalid syntax, unparenthesized ':='".to_string())
        }
        "identifier" => {
            let text = node.utf8_text(source).ok()?;
            KEYWORDS
                .contains(&text)
                .then(|| format!("invalid syntax, '{text}' is a reserved keyword"))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_function() {
        let verdict = check("def hello():\n    print(\"Hello World\")\n");
        assert!(verdict.valid);
        assert_eq!(verdict.detail, "Valid syntax");
    }

    #[test]
    fn empty_module_is_valid() {
        assert!(check("").valid);
    }

    #[test]
    fn missing_colon_reports_kind_and_line() {
        let verdict = check("import os\n\ndef hello()\n    print(\"Hello World\")\n");
        assert!(!verdict.valid);
        assert!(verdict.detail.starts_with("SyntaxError:"), "{}", verdict.detail);
        let line: usize = verdict
            .detail
            .rsplit("at line ")
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!((3..=4).contains(&line), "{}", verdict.detail);
    }

    #[test]
    fn one_line_def_without_colon() {
        let verdict = check("def main() pass");
        assert!(!verdict.valid);
        assert!(verdict.detail.contains("SyntaxError"));
    }

    #[test]
    fn unbalanced_paren() {
        let verdict = check("x = (1 + 2\ny = 3\n");
        assert!(!verdict.valid);
        assert!(verdict.detail.contains("SyntaxError"));
    }

    fn rejected_at(code: &str) -> String {
        let verdict = check(code);
        assert!(!verdict.valid, "accepted {code:?}");
        verdict.detail
    }

    #[test]
    fn python2_print_statement() {
        let detail = rejected_at("import sys\n\nprint \"hello\"\n");
        assert_eq!(
            detail,
            "SyntaxError: Missing parentheses in call to 'print' at line 3"
        );
        assert!(rejected_at("print >>sys.stderr, 'x'\n").contains("'print'"));
    }

    #[test]
    fn python2_exec_statement() {
        assert!(rejected_at("exec \"x = 1\"\n").contains("'exec' at line 1"));
    }

    #[test]
    fn bare_walrus_statement() {
        assert!(rejected_at("x := 1\n").contains("':='"));
    }

    #[test]
    fn async_as_a_name() {
        assert!(rejected_at("async = 1\n").contains("'async' is a reserved keyword"));
    }

    #[test]
    fn python3_forms_still_pass() {
        let code = "import sys\n\n\
                    async def fetch(items):\n    \
                        if (n := len(items)) > 0:\n        \
                            print(n, file=sys.stderr)\n    \
                        exec(\"y = 2\")\n    \
                        return [await item for item in items]\n";
        let verdict = check(code);
        assert!(verdict.valid, "{}", verdict.detail);
    }

    #[test]
    fn markdown_fence_is_not_python() {
        let verdict = check("```python\ndef f():\n    return 1\n```");
        assert!(!verdict.valid);
    }
}
