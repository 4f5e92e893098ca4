use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;

/// Opaque pagination resume point, anchored on the last-emitted sort key
/// rather than a positional offset. Encodes `(created_at, id)` so that rows
/// inserted after the cursor was issued can neither duplicate nor displace
/// entries in later pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: i64,
    pub id: String,
}

impl Cursor {
    pub fn encode(&self) -> String {
        B64.encode(format!("{}:{}", self.created_at, self.id))
    }

    /// Decode a caller-supplied token. Returns `None` for anything that is
    /// not a well-formed `created_at:id` pair.
    pub fn decode(token: &str) -> Option<Self> {
        let raw = B64.decode(token).ok()?;
        let text = String::from_utf8(raw).ok()?;
        let (ts, id) = text.split_once(':')?;
        let created_at = ts.parse::<i64>().ok()?;
        if id.is_empty() {
            return None;
        }
        Some(Self {
            created_at,
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cursor = Cursor {
            created_at: 1_700_000_000_123,
            id: "0d6a7e5e-9f3a-4c57-8b27-000000000042".into(),
        };
        let token = cursor.encode();
        assert_eq!(Cursor::decode(&token), Some(cursor));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Cursor::decode("not base64 at all!"), None);
        // valid base64, but no separator
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("12345");
        assert_eq!(Cursor::decode(&token), None);
        // separator but non-numeric timestamp
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("abc:id");
        assert_eq!(Cursor::decode(&token), None);
        // empty id
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("123:");
        assert_eq!(Cursor::decode(&token), None);
    }

    #[test]
    fn id_may_contain_separators() {
        // UUIDs have no colons, but the format must survive one in the id.
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("7:a:b");
        let cursor = Cursor::decode(&token).unwrap();
        assert_eq!(cursor.created_at, 7);
        assert_eq!(cursor.id, "a:b");
    }
}
