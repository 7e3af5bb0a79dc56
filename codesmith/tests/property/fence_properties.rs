use codesmith::fences::strip_code_fences;
use proptest::prelude::*;

/// A reply wrapped in one fence: optional padding, a tag, a body.
fn fenced() -> impl Strategy<Value = (String, String)> {
    ("[ \n]{0,3}", "[A-Za-z0-9_+#.-]{0,10}", "[^`]{0,120}", "[ \n]{0,3}").prop_map(
        |(lead, tag, body, trail)| (format!("{lead}```{tag}\n{body}\n```{trail}"), body),
    )
}

proptest! {
    #[test]
    fn idempotent_on_any_text(s in any::<String>()) {
        let once = strip_code_fences(&s);
        prop_assert_eq!(strip_code_fences(&once), once);
    }

    #[test]
    fn idempotent_on_fence_soup(s in "[`a-z \n+]{0,60}") {
        let once = strip_code_fences(&s);
        prop_assert_eq!(strip_code_fences(&once), once);
    }

    #[test]
    fn unfenced_text_is_only_trimmed(s in any::<String>()) {
        prop_assume!(!s.contains("```"));
        prop_assert_eq!(strip_code_fences(&s), s.trim());
    }

    #[test]
    fn fenced_body_is_recovered((reply, body) in fenced()) {
        let stripped = strip_code_fences(&reply);
        prop_assert_eq!(&stripped, body.trim());
        prop_assert_eq!(strip_code_fences(&stripped), stripped);
    }
}
