//! SASL challenge handling for AUTHENTICATE.

/// Answers the server challenges of an `AUTHENTICATE` exchange.
///
/// The engine base64-decodes each challenge before calling
/// [`Authenticator::process`] and base64-encodes the returned response.
pub trait Authenticator: Send {
    /// Produces the response to one decoded challenge.
    fn process(&mut self, challenge: &[u8]) -> Vec<u8>;
}

impl<F> Authenticator for F
where
    F: FnMut(&[u8]) -> Vec<u8> + Send,
{
    fn process(&mut self, challenge: &[u8]) -> Vec<u8> {
        self(challenge)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    struct Plain {
        user: &'static str,
        password: &'static str,
    }

    impl Authenticator for Plain {
        fn process(&mut self, _challenge: &[u8]) -> Vec<u8> {
            format!("\0{}\0{}", self.user, self.password).into_bytes()
        }
    }

    #[test]
    fn test_closure_authenticator() {
        let mut seen = Vec::new();
        let mut auth = |challenge: &[u8]| {
            seen.push(challenge.to_vec());
            b"reply".to_vec()
        };
        assert_eq!(auth.process(b"nonce"), b"reply");
        assert_eq!(seen, [b"nonce".to_vec()]);
    }

    #[test]
    fn test_plain_authenticator() {
        let mut auth = Plain {
            user: "user",
            password: "secret",
        };
        assert_eq!(auth.process(b""), b"\0user\0secret");
    }
}
