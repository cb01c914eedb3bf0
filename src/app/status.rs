/// Loading/error contract of the record list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStatus {
    loading: bool,
    error: Option<String>,
}

impl LoadStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started(&mut self) {
        self.loading = true;
    }

    pub fn succeeded(&mut self) {
        self.loading = false;
        self.error = None;
    }

    /// Rows already on screen are kept by the caller.
    pub fn failed(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.error = Some(message.into());
    }

    pub fn message(&self) -> String {
        match (&self.error, self.loading) {
            (Some(error), _) => format!("Error: {error}"),
            (None, true) => "Loading…".to_string(),
            (None, false) => "Ready".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_clears_loading_and_success_clears_error() {
        let mut status = LoadStatus::new();
        status.started();
        assert!(status.is_loading());
        status.failed("offline");
        assert!(!status.is_loading());
        assert_eq!(status.message(), "Error: offline");
        status.started();
        status.succeeded();
        assert_eq!(status.error(), None);
    }
}
