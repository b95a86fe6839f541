//! Upsert options builder.

use serde::Serialize;

/// Per-call upsert behaviour. Built with [`UpsertOptionsBuilder`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOptions {
    /// Conflict target. Empty means the table's primary key.
    pub key_columns: Vec<String>,
    /// `jsonb` columns merged into the stored object (`stored || incoming`)
    /// instead of replaced.
    pub shallow_merge_jsonb_columns: Vec<String>,
    /// Columns that are written but never count as a change on their own
    /// (e.g. `updated_at`).
    pub no_diff_columns: Vec<String>,
    /// Columns written on insert and never updated.
    pub insert_only_columns: Vec<String>,
    /// Columns whose stored value must equal the incoming one for an update
    /// to happen (e.g. `org_id`).
    pub must_match_columns: Vec<String>,
    /// Keep columns that are undefined in every row and write `DEFAULT`.
    pub undefined_as_default: bool,
}

impl UpsertOptions {
    #[must_use]
    pub fn builder() -> UpsertOptionsBuilder {
        UpsertOptionsBuilder::new()
    }
}

#[derive(Debug, Default)]
pub struct UpsertOptionsBuilder(UpsertOptions);

fn collect<I, S>(columns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    columns.into_iter().map(Into::into).collect()
}

impl UpsertOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self(UpsertOptions::default())
    }

    #[must_use]
    pub fn key_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.key_columns = collect(columns);
        self
    }

    #[must_use]
    pub fn shallow_merge_jsonb_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.shallow_merge_jsonb_columns = collect(columns);
        self
    }

    #[must_use]
    pub fn no_diff_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.no_diff_columns = collect(columns);
        self
    }

    #[must_use]
    pub fn insert_only_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.insert_only_columns = collect(columns);
        self
    }

    #[must_use]
    pub fn must_match_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.must_match_columns = collect(columns);
        self
    }

    #[must_use]
    pub fn undefined_as_default(mut self, enabled: bool) -> Self {
        self.0.undefined_as_default = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> UpsertOptions {
        self.0
    }
}
