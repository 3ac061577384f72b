/// Extension trait for `Result`s whose failure degrades an operation
/// instead of aborting it.
pub trait ResultDegradeExt<T, E> {
    /// Converts the result into an [`Option`], logging the error at warn
    /// level together with `context`.
    fn ok_warn(self, context: &str) -> Option<T>;
}

impl<T, E> ResultDegradeExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}
