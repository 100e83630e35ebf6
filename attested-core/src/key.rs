//! Store keys for (subject, attribute) pairs.
//!
//! A key is the UTF-8 string `<cid>/<attribute>`. The base32 alphabet of the
//! CID has no `/`, so the first separator always ends the subject: two
//! distinct pairs can never produce the same key. All attributes of a subject
//! share the prefix `<cid>/` and sort next to each other.

use crate::types::{ContentId, FormatError};

/// Separator between the subject and the attribute name.
pub const SEPARATOR: char = '/';

/// Build the store key for an attribute of a subject.
pub fn encode_key(subject: &ContentId, attribute: &str) -> Vec<u8> {
    let mut key = subject_prefix(subject);
    key.extend_from_slice(attribute.as_bytes());
    key
}

/// The key prefix shared by every attribute of `subject`.
pub fn subject_prefix(subject: &ContentId) -> Vec<u8> {
    let mut prefix = subject.to_string().into_bytes();
    prefix.push(SEPARATOR as u8);
    prefix
}

/// Split a store key back into its subject and attribute.
pub fn decode_key(key: &[u8]) -> Result<(ContentId, String), FormatError> {
    let key = std::str::from_utf8(key)
        .map_err(|_| FormatError::MalformedKey("key is not valid UTF-8".to_string()))?;
    let (subject, attribute) = key
        .split_once(SEPARATOR)
        .ok_or_else(|| FormatError::MalformedKey(format!("no separator in {key:?}")))?;
    Ok((ContentId::parse(subject)?, attribute.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cid(data: &[u8]) -> ContentId {
        ContentId::for_raw_block(data)
    }

    #[test]
    fn test_key_layout() {
        let subject = cid(b"hello world");
        let key = encode_key(&subject, "filename");
        assert_eq!(
            key,
            b"bafkreifzjut3te2nhyekklss27nh3k72ysco7y32koao5eei66wof36n5e/filename".to_vec()
        );
    }

    #[test]
    fn test_decode_key() {
        let subject = cid(b"asset");
        let key = encode_key(&subject, "nested/attr");
        let (decoded, attribute) = decode_key(&key).unwrap();
        assert_eq!(decoded, subject);
        assert_eq!(attribute, "nested/attr");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(
            decode_key(b"no-separator"),
            Err(FormatError::MalformedKey(_))
        ));
        assert!(decode_key(b"bnotacid/attr").is_err());
        assert!(decode_key(&[0xff, b'/', b'a']).is_err());
    }

    #[test]
    fn test_subject_attributes_are_contiguous() {
        let a = cid(b"a");
        let prefix = subject_prefix(&a);
        assert!(encode_key(&a, "").starts_with(&prefix));
        assert!(encode_key(&a, "zzz").starts_with(&prefix));
    }

    proptest! {
        #[test]
        fn prop_key_injective(
            data_a in proptest::collection::vec(any::<u8>(), 0..16),
            data_b in proptest::collection::vec(any::<u8>(), 0..16),
            attr_a in ".{0,12}",
            attr_b in ".{0,12}",
        ) {
            let (sa, sb) = (cid(&data_a), cid(&data_b));
            let same_pair = sa == sb && attr_a == attr_b;
            prop_assert_eq!(encode_key(&sa, &attr_a) == encode_key(&sb, &attr_b), same_pair);
        }

        #[test]
        fn prop_key_decodes_to_pair(data in proptest::collection::vec(any::<u8>(), 0..16), attr in ".{0,12}") {
            let subject = cid(&data);
            let (decoded, attribute) = decode_key(&encode_key(&subject, &attr)).unwrap();
            prop_assert_eq!(decoded, subject);
            prop_assert_eq!(attribute, attr);
        }
    }
}
