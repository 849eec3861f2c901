use std::fmt;

/// Wraps a secret payload so it never leaks through `Debug` / `Display`.
///
/// Tracing fields, panic messages and error strings that format a
/// `Sensitive` value only ever see `[REDACTED]`.
#[derive(Clone, Default, Eq, PartialEq, Hash)]
pub struct Sensitive<T>(pub T);

impl<T> Sensitive<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl Sensitive<Vec<u8>> {
    /// Decodes the payload as UTF-8, keeping the result wrapped.
    pub fn into_utf8(self) -> Result<Sensitive<String>, std::string::FromUtf8Error> {
        String::from_utf8(self.0).map(Sensitive)
    }
}

impl<T> From<T> for Sensitive<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
