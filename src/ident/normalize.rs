use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static DOUBLED_THREAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"thread-f:#?thread-f:(\d+)").expect("valid doubled thread regex"));
static THREAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"thread-f:(\d+)").expect("valid thread regex"));
static MSG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"msg-f:(\d+)").expect("valid msg regex"));
static MESSAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:message-id:)+(\S+)").expect("valid message-id regex"));
static LONG_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{10,}").expect("valid digit run regex"));

/// An identifier after normalization. Normalizing it again is a no-op.
///
/// Unrecognized inputs pass through, so a value of this type is not
/// guaranteed to name anything the message store knows about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalId(String);

impl CanonicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize a raw identifier captured from the page.
///
/// Rules apply in order and the first match wins:
/// 1. a doubled thread prefix (`thread-f:thread-f:N`, `thread-f:#thread-f:N`) yields `N`
/// 2. a leading `#` is dropped
/// 3. `thread-f:N` yields `N`
/// 4. `msg-f:N` yields `N`
/// 5. `message-id:T` yields `T`
/// 6. any run of ten or more digits is returned
/// 7. anything else comes back as is
///
/// The chain is reapplied until the value stops changing. Every rule that
/// changes its input returns a strictly shorter string, so this terminates.
pub fn normalize(raw: &str) -> CanonicalId {
    let mut id = raw.to_string();
    loop {
        let next = apply_rules(&id);
        if next == id {
            return CanonicalId(id);
        }
        id = next;
    }
}

fn apply_rules(raw: &str) -> String {
    if let Some(cap) = DOUBLED_THREAD_RE.captures(raw) {
        tracing::debug!("Repaired doubled thread prefix in {}", raw);
        return cap[1].to_string();
    }

    let id = raw.strip_prefix('#').unwrap_or(raw);

    for re in [&*THREAD_RE, &*MSG_RE, &*MESSAGE_ID_RE] {
        if let Some(cap) = re.captures(id) {
            return cap[1].to_string();
        }
    }

    if let Some(digits) = LONG_DIGITS_RE.find(id) {
        return digits.as_str().to_string();
    }

    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubled_prefix_is_repaired() {
        assert_eq!(normalize("thread-f:thread-f:123").as_str(), "123");
        assert_eq!(normalize("thread-f:#thread-f:123").as_str(), "123");
    }

    #[test]
    fn test_known_forms() {
        assert_eq!(normalize("#thread-f:9876543210").as_str(), "9876543210");
        assert_eq!(normalize("thread-f:1788").as_str(), "1788");
        assert_eq!(normalize("msg-f:555").as_str(), "555");
        assert_eq!(normalize("message-id:abc@x").as_str(), "abc@x");
        assert_eq!(normalize("#inbox/1234567890123/x").as_str(), "1234567890123");
    }

    #[test]
    fn test_unrecognized_passes_through() {
        assert_eq!(normalize("FMfcgzQZTzW").as_str(), "FMfcgzQZTzW");
        assert_eq!(normalize("").as_str(), "");
        assert_eq!(normalize("#r-123").as_str(), "r-123");
    }

    #[test]
    fn test_nested_forms_settle() {
        assert_eq!(normalize("##x").as_str(), "x");
        assert_eq!(normalize("message-id:#abc").as_str(), "abc");
        assert_eq!(
            normalize("message-id:CAB1234567890abc@mail.gmail.com").as_str(),
            "1234567890"
        );
        assert_eq!(normalize("message-id:abc@x").as_str(), "abc@x");
        assert_eq!(normalize("123").as_str(), "123");
        assert_eq!(normalize("9876543210").as_str(), "9876543210");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "thread-f:thread-f:123",
            "thread-f:#thread-f:123",
            "#thread-f:9876543210",
            "thread-f:1788203948573829",
            "msg-f:555",
            "message-id:abc@x",
            "message-id:message-id:abc@x",
            "1234567890123",
            "prefix-1234567890-suffix",
            "#msg-f:42",
            "message-id:CAB1234567890abc@mail.gmail.com",
            "message-id:<CAOx9f7Qk2=123456789012@mail.example.com>",
            "##x",
            "message-id:#abc",
            "#message-id:msg-f:77",
            "FMfcgzQZTzW",
            "",
        ];

        for input in inputs {
            let once = normalize(input);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }
}
