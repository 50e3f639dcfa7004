/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required credential or endpoint is not configured.
    ConfigMissing,
    /// A network failure or a non-success response status.
    Transport,
    /// The response payload could not be decoded.
    Decode,
    /// Any other errors.
    Other,
}
