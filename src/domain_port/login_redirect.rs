/// Sends the user back to the authentication entry point after terminal expiry.
pub trait LoginRedirect: Send + Sync {
    fn redirect(&self, route: &str);
}

#[derive(Debug, Default)]
pub struct LogOnlyRedirect;

impl LoginRedirect for LogOnlyRedirect {
    fn redirect(&self, route: &str) {
        tracing::warn!(route, "session expired, re-authentication required");
    }
}
