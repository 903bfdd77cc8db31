use nutype::nutype;

/// Process-wide name of a resource producer.
///
/// UniqueName is the key a producer registers under with the
/// [`ResourceRegistrar`](crate::ResourceRegistrar) and the only data needed to
/// reconstruct the producer from a naming reference. Names are:
/// - Non-empty (trimmed strings with at least 1 character)
/// - Within reasonable length (max 255 characters)
/// - Sanitized (leading/trailing whitespace removed)
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct UniqueName(String);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unique_name_trims_whitespace() {
        let name = UniqueName::try_new("  resource-orders ").expect("valid name");

        assert_eq!(name.as_ref(), "resource-orders");
    }

    #[test]
    fn unique_name_rejects_blank_input() {
        assert!(UniqueName::try_new("   ").is_err());
    }

    #[test]
    fn unique_name_rejects_names_longer_than_255_chars() {
        assert!(UniqueName::try_new("x".repeat(256)).is_err());
    }

    #[test]
    fn unique_name_serializes_as_plain_string() {
        let name = UniqueName::try_new("resource-orders").expect("valid name");

        let json = serde_json::to_string(&name).expect("serializable");

        assert_eq!(json, "\"resource-orders\"");
    }

    proptest! {
        #[test]
        fn any_visible_name_within_limit_is_accepted(raw in "[a-z0-9-]{1,255}") {
            let name = UniqueName::try_new(raw.clone()).expect("valid name");
            prop_assert_eq!(name.as_ref(), raw.as_str());
        }
    }
}
