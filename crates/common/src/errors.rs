use errors::ErrorMetadataAnyhowExt;

/// Log an error at the point where it leaves the system (eg the HTTP
/// boundary). Caller-at-fault errors are expected traffic and only logged at
/// debug level.
pub fn report_error(err: &mut anyhow::Error) {
    if err.is_deterministic_user_error() {
        tracing::debug!("Caller error: {err:#}");
    } else {
        tracing::error!("{err:#}");
    }
}
