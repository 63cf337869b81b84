use filedrop_core::{normalize_extension, remaining_capacity, CapacityNotice, LocalFile};

/// Intake validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid file extension: {extension} (allowed: {allowed:?})")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Missing file extension: {0}")]
    MissingExtension(String),
}

/// Accepted-extension filter
///
/// Extensions are compared case-insensitively, with or without a leading dot. An empty
/// accepted set lets every file through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    accepted: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for ext in accepted {
            let ext = normalize_extension(ext.as_ref());
            if !ext.is_empty() && !normalized.contains(&ext) {
                normalized.push(ext);
            }
        }
        Self {
            accepted: normalized,
        }
    }

    /// Filter that accepts every file.
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> &[String] {
        &self.accepted
    }

    pub fn accepts_all(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Validate a file's extension against the accepted set
    pub fn validate(&self, file: &LocalFile) -> Result<(), ValidationError> {
        if self.accepts_all() {
            return Ok(());
        }

        let extension = file
            .extension()
            .ok_or_else(|| ValidationError::MissingExtension(file.name.clone()))?;

        if !self.accepted.contains(&extension) {
            return Err(ValidationError::InvalidExtension {
                extension,
                allowed: self.accepted.clone(),
            });
        }

        Ok(())
    }

    pub fn accepts(&self, file: &LocalFile) -> bool {
        self.validate(file).is_ok()
    }
}

/// Outcome of planning one intake batch.
#[derive(Debug, Default)]
pub struct IntakePlan {
    /// Files that passed the filter and fit, in arrival order.
    pub accepted: Vec<LocalFile>,
    /// Files whose extension is not accepted.
    pub rejected: Vec<LocalFile>,
    /// Files that passed the filter but did not fit.
    pub dropped: Vec<LocalFile>,
    /// Set when `dropped` is non-empty.
    pub notice: Option<CapacityNotice>,
}

/// Split `items` into the part that fits and the surplus.
///
/// Returns a notice only when something was dropped.
pub fn truncate_to_capacity<T>(
    mut items: Vec<T>,
    current_len: usize,
    limit: Option<usize>,
) -> (Vec<T>, Vec<T>, Option<CapacityNotice>) {
    let remaining = remaining_capacity(limit, current_len);
    if items.len() <= remaining {
        return (items, Vec::new(), None);
    }

    let dropped = items.split_off(remaining);
    let notice = CapacityNotice::for_dropped(limit, dropped.len());
    (items, dropped, notice)
}

/// Apply the extension filter, then truncate the survivors to the remaining capacity.
pub fn plan_intake(
    filter: &ExtensionFilter,
    candidates: Vec<LocalFile>,
    current_len: usize,
    limit: Option<usize>,
) -> IntakePlan {
    let mut passed = Vec::with_capacity(candidates.len());
    let mut rejected = Vec::new();

    for file in candidates {
        match filter.validate(&file) {
            Ok(()) => passed.push(file),
            Err(e) => {
                tracing::debug!(file = %file.name, reason = %e, "File rejected by extension filter");
                rejected.push(file);
            }
        }
    }

    let (accepted, dropped, notice) = truncate_to_capacity(passed, current_len, limit);

    IntakePlan {
        accepted,
        rejected,
        dropped,
        notice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<LocalFile> {
        names
            .iter()
            .map(|n| LocalFile::new(format!("/tmp/{}", n)))
            .collect()
    }

    fn names(files: &[LocalFile]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_validate_extension_ok() {
        let filter = ExtensionFilter::new([".PNG", "jpg"]);
        assert_eq!(filter.accepted(), &["png", "jpg"]);
        assert!(filter.accepts(&LocalFile::new("/tmp/a.png")));
        assert!(filter.accepts(&LocalFile::new("/tmp/B.JPG")));
    }

    #[test]
    fn test_validate_extension_invalid() {
        let filter = ExtensionFilter::new(["png"]);
        let result = filter.validate(&LocalFile::new("/tmp/a.gif"));
        assert!(matches!(result, Err(ValidationError::InvalidExtension { .. })));
    }

    #[test]
    fn test_validate_extension_missing() {
        let filter = ExtensionFilter::new(["png"]);
        let result = filter.validate(&LocalFile::new("/tmp/README"));
        assert!(matches!(result, Err(ValidationError::MissingExtension(_))));
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = ExtensionFilter::accept_all();
        assert!(filter.accepts(&LocalFile::new("/tmp/README")));
        assert!(filter.accepts(&LocalFile::new("/tmp/a.exe")));
    }

    #[test]
    fn test_plan_intake_filters_then_truncates() {
        let filter = ExtensionFilter::new([".png"]);
        let plan = plan_intake(
            &filter,
            files(&["a.png", "b.jpg", "c.png", "d.png"]),
            0,
            Some(2),
        );

        assert_eq!(names(&plan.accepted), vec!["a.png", "c.png"]);
        assert_eq!(names(&plan.rejected), vec!["b.jpg"]);
        assert_eq!(names(&plan.dropped), vec!["d.png"]);
        assert_eq!(
            plan.notice,
            Some(CapacityNotice {
                dropped: 1,
                limit: 2
            })
        );
    }

    #[test]
    fn test_plan_intake_counts_existing_items() {
        let plan = plan_intake(
            &ExtensionFilter::accept_all(),
            files(&["a.png", "b.png", "c.png"]),
            4,
            Some(5),
        );
        assert_eq!(names(&plan.accepted), vec!["a.png"]);
        assert_eq!(plan.notice.map(|n| n.dropped), Some(2));
    }

    #[test]
    fn test_plan_intake_no_notice_when_everything_fits() {
        let plan = plan_intake(&ExtensionFilter::accept_all(), files(&["a.png"]), 0, Some(1));
        assert_eq!(plan.accepted.len(), 1);
        assert!(plan.notice.is_none());

        let plan = plan_intake(&ExtensionFilter::accept_all(), files(&["a", "b"]), 100, None);
        assert_eq!(plan.accepted.len(), 2);
        assert!(plan.notice.is_none());
    }

    #[test]
    fn test_rejected_files_never_count_against_capacity() {
        let filter = ExtensionFilter::new(["png"]);
        let plan = plan_intake(&filter, files(&["a.txt", "b.txt", "c.png"]), 0, Some(1));
        assert_eq!(names(&plan.accepted), vec!["c.png"]);
        assert!(plan.notice.is_none());
    }

    #[test]
    fn test_queue_already_full() {
        let (kept, dropped, notice) = truncate_to_capacity(vec![1, 2], 3, Some(3));
        assert!(kept.is_empty());
        assert_eq!(dropped, vec![1, 2]);
        assert_eq!(notice.map(|n| n.dropped), Some(2));
    }
}
