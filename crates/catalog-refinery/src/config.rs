//! Configuration types for the refinery pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup, plus the presets for the two
//! catalog exports the pipeline was built around.

use crate::features::FeatureSpec;
use serde::{Deserialize, Serialize};

/// Logical type a raw string column is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Currency/thousands-tolerant floating point.
    Numeric,
    /// Fixed true/false token table; unmapped tokens become `false`.
    Boolean,
    /// Calendar timestamp plus derived year/month/day/weekday columns.
    Temporal,
    /// Normalized free text; never left missing.
    Text,
}

/// A caller-declared (column, role) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoleSpec {
    pub column: String,
    pub role: ColumnRole,
}

impl ColumnRoleSpec {
    pub fn new(column: impl Into<String>, role: ColumnRole) -> Self {
        Self {
            column: column.into(),
            role,
        }
    }
}

/// Tokenizer options the caller may override for the raw reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Quote byte.
    pub quote: u8,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

/// Configuration for the refinery pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use catalog_refinery::config::{ColumnRole, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .column_role("Price", ColumnRole::Numeric)
///     .partition("root_category_name", ["initial_price", "discount"])
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Declared (column, role) pairs for the coercion layer.
    /// Columns not listed stay as raw strings.
    pub column_roles: Vec<ColumnRoleSpec>,

    /// Numeric columns considered by the imputation selector.
    /// `None` means every numeric column.
    pub imputation_targets: Option<Vec<String>>,

    /// Numeric columns bounded by the outlier bounder, in this order.
    /// `None` means every numeric column in table order.
    pub outlier_columns: Option<Vec<String>>,

    /// Partition key for the category-conditioned null policy.
    pub partition_key: Option<String>,

    /// Target columns whose nulls the partition policy drops or fills.
    pub partition_targets: Vec<String>,

    /// Null-density threshold for the partition policy (0.0 - 1.0).
    /// Default: 0.05
    pub partition_drop_threshold: f64,

    /// Identifier column for latest-record deduplication.
    pub dedupe_key: Option<String>,

    /// Fetch timestamp column used to pick the latest record per identifier.
    pub fetch_time_column: Option<String>,

    /// Whether to remove fully identical rows.
    /// Default: false
    pub remove_duplicates: bool,

    /// Derived feature columns appended after the engine runs.
    pub derived_features: Vec<FeatureSpec>,

    /// Identifier-like columns the pruner may drop when nearly unique.
    pub prune_identifier_columns: Vec<String>,

    /// Upper bound on KNN neighbors.
    /// Default: 5
    pub knn_max_neighbors: usize,

    /// Upper bound on KNN feature columns, the target included.
    /// Default: 6
    pub knn_max_features: usize,

    /// Iteration cap for the iterative imputer.
    /// Default: 10
    pub iterative_max_iter: usize,

    /// Seed for the iterative imputer.
    /// Default: 42
    pub iterative_seed: u64,

    /// Columns at or above this missing fraction are left to the pruner.
    /// Default: 0.95
    pub exclusion_missing_fraction: f64,

    /// Tokenizer options for the raw reader.
    pub parse_options: ParseOptions,

    /// Whether to normalize output column names.
    /// Default: true
    pub normalize_column_names: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            column_roles: Vec::new(),
            imputation_targets: None,
            outlier_columns: None,
            partition_key: None,
            partition_targets: Vec::new(),
            partition_drop_threshold: 0.05,
            dedupe_key: None,
            fetch_time_column: None,
            remove_duplicates: false,
            derived_features: Vec::new(),
            prune_identifier_columns: Vec::new(),
            knn_max_neighbors: 5,
            knn_max_features: 6,
            iterative_max_iter: 10,
            iterative_seed: 42,
            exclusion_missing_fraction: 0.95,
            parse_options: ParseOptions::default(),
            normalize_column_names: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Look up the declared role of a column.
    pub fn role_of(&self, column: &str) -> Option<ColumnRole> {
        self.column_roles
            .iter()
            .find(|spec| spec.column == column)
            .map(|spec| spec.role)
    }

    /// Preset for the marketing catalog export (phones with ratings).
    pub fn marketing_preset() -> Self {
        let numeric = [
            "Price",
            "Monthly Price",
            "Num Of Reviews",
            "Average Rating",
            "Number Of Ratings",
            "Five Star",
            "Four Star",
            "Three Star",
            "Two Star",
            "One Star",
        ];
        let text = [
            "Title",
            "Manufacturer",
            "Model Name",
            "Carrier",
            "Color Category",
            "Internal Memory",
            "Screen Size",
            "Specifications",
        ];
        let boolean = ["Stock", "Discontinued", "Broken Link"];

        let mut column_roles: Vec<ColumnRoleSpec> = numeric
            .iter()
            .map(|c| ColumnRoleSpec::new(*c, ColumnRole::Numeric))
            .collect();
        column_roles.extend(text.iter().map(|c| ColumnRoleSpec::new(*c, ColumnRole::Text)));
        column_roles.extend(
            boolean
                .iter()
                .map(|c| ColumnRoleSpec::new(*c, ColumnRole::Boolean)),
        );
        column_roles.push(ColumnRoleSpec::new("Crawl Timestamp", ColumnRole::Temporal));

        Self {
            column_roles,
            imputation_targets: Some(numeric.iter().map(|c| c.to_string()).collect()),
            outlier_columns: Some(
                [
                    "Price",
                    "Monthly Price",
                    "Average Rating",
                    "Num Of Reviews",
                    "Number Of Ratings",
                ]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            ),
            derived_features: FeatureSpec::marketing_catalog(),
            prune_identifier_columns: vec!["Uniq Id".to_string(), "Pageurl".to_string()],
            ..Self::default()
        }
    }

    /// Preset for the product listing export partitioned by root category.
    pub fn products_preset() -> Self {
        let mut column_roles: Vec<ColumnRoleSpec> = [
            "final_price",
            "initial_price",
            "discount",
            "review_count",
            "rating",
        ]
        .iter()
        .map(|c| ColumnRoleSpec::new(*c, ColumnRole::Numeric))
        .collect();
        column_roles.extend(
            ["product_name", "brand", "category_name", "root_category_name"]
                .iter()
                .map(|c| ColumnRoleSpec::new(*c, ColumnRole::Text)),
        );
        column_roles.extend(
            ["available_for_delivery", "available_for_pickup"]
                .iter()
                .map(|c| ColumnRoleSpec::new(*c, ColumnRole::Boolean)),
        );

        Self {
            column_roles,
            partition_key: Some("root_category_name".to_string()),
            partition_targets: vec!["initial_price".to_string(), "discount".to_string()],
            dedupe_key: Some("product_id".to_string()),
            fetch_time_column: Some("fetch_time".to_string()),
            remove_duplicates: true,
            ..Self::default()
        }
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (field, value) in [
            ("partition_drop_threshold", self.partition_drop_threshold),
            ("exclusion_missing_fraction", self.exclusion_missing_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if self.knn_max_neighbors == 0 {
            return Err(ConfigValidationError::InvalidKnnNeighbors(
                self.knn_max_neighbors,
            ));
        }

        if self.knn_max_features < 2 {
            return Err(ConfigValidationError::InvalidKnnFeatures(
                self.knn_max_features,
            ));
        }

        if self.iterative_max_iter == 0 {
            return Err(ConfigValidationError::InvalidIterationCap(
                self.iterative_max_iter,
            ));
        }

        if self.partition_key.is_some() && self.partition_targets.is_empty() {
            return Err(ConfigValidationError::MissingPartitionTargets);
        }

        if self.parse_options.delimiter == self.parse_options.quote {
            return Err(ConfigValidationError::AmbiguousParseOptions);
        }

        for feature in &self.derived_features {
            feature
                .validate()
                .map_err(|reason| ConfigValidationError::InvalidFeature {
                    output: feature.output().to_string(),
                    reason,
                })?;
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid KNN neighbors: {0} (must be at least 1)")]
    InvalidKnnNeighbors(usize),

    #[error("Invalid KNN feature cap: {0} (must be at least 2)")]
    InvalidKnnFeatures(usize),

    #[error("Invalid iteration cap: {0} (must be at least 1)")]
    InvalidIterationCap(usize),

    #[error("A partition key was set without any partition target columns")]
    MissingPartitionTargets,

    #[error("Delimiter and quote character must differ")]
    AmbiguousParseOptions,

    #[error("Invalid derived feature '{output}': {reason}")]
    InvalidFeature { output: String, reason: String },
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    base: Option<PipelineConfig>,
    column_roles: Vec<ColumnRoleSpec>,
    imputation_targets: Option<Vec<String>>,
    outlier_columns: Option<Vec<String>>,
    partition: Option<(String, Vec<String>)>,
    partition_drop_threshold: Option<f64>,
    dedupe: Option<(String, Option<String>)>,
    remove_duplicates: Option<bool>,
    derived_features: Vec<FeatureSpec>,
    prune_identifier_columns: Vec<String>,
    knn_max_neighbors: Option<usize>,
    iterative_max_iter: Option<usize>,
    iterative_seed: Option<u64>,
    parse_options: Option<ParseOptions>,
    normalize_column_names: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Start from an existing configuration (e.g. a preset) instead of the defaults.
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            base: Some(config),
            ..Self::default()
        }
    }

    /// Declare the role of a column.
    pub fn column_role(mut self, column: impl Into<String>, role: ColumnRole) -> Self {
        self.column_roles.push(ColumnRoleSpec::new(column, role));
        self
    }

    /// Restrict the imputation selector to these numeric columns.
    pub fn imputation_targets<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imputation_targets = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the outlier bounder to these columns, in this order.
    pub fn outlier_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outlier_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Enable the category-conditioned null policy.
    pub fn partition<I, S>(mut self, key: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition = Some((key.into(), targets.into_iter().map(Into::into).collect()));
        self
    }

    /// Set the null-density threshold for the partition policy.
    ///
    /// # Arguments
    /// * `threshold` - Value between 0.0 and 1.0 (e.g., 0.05 = 5%)
    pub fn partition_drop_threshold(mut self, threshold: f64) -> Self {
        self.partition_drop_threshold = Some(threshold);
        self
    }

    /// Keep only the most recently fetched row per identifier.
    pub fn dedupe_latest(
        mut self,
        key: impl Into<String>,
        fetch_time_column: Option<String>,
    ) -> Self {
        self.dedupe = Some((key.into(), fetch_time_column));
        self
    }

    /// Enable or disable exact duplicate row removal.
    pub fn remove_duplicates(mut self, remove: bool) -> Self {
        self.remove_duplicates = Some(remove);
        self
    }

    /// Append a derived feature.
    pub fn derive(mut self, feature: FeatureSpec) -> Self {
        self.derived_features.push(feature);
        self
    }

    /// Declare an identifier column the pruner may drop.
    pub fn prune_identifier(mut self, column: impl Into<String>) -> Self {
        self.prune_identifier_columns.push(column.into());
        self
    }

    /// Set the upper bound on KNN neighbors.
    pub fn knn_max_neighbors(mut self, k: usize) -> Self {
        self.knn_max_neighbors = Some(k);
        self
    }

    /// Set the iteration cap for the iterative imputer.
    pub fn iterative_max_iter(mut self, max_iter: usize) -> Self {
        self.iterative_max_iter = Some(max_iter);
        self
    }

    /// Set the seed for the iterative imputer.
    pub fn iterative_seed(mut self, seed: u64) -> Self {
        self.iterative_seed = Some(seed);
        self
    }

    /// Override the raw tokenizer options.
    pub fn parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = Some(options);
        self
    }

    /// Enable or disable output column name normalization.
    pub fn normalize_column_names(mut self, normalize: bool) -> Self {
        self.normalize_column_names = Some(normalize);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let mut config = self.base.unwrap_or_default();

        config.column_roles.extend(self.column_roles);
        config.derived_features.extend(self.derived_features);
        config
            .prune_identifier_columns
            .extend(self.prune_identifier_columns);

        if let Some(targets) = self.imputation_targets {
            config.imputation_targets = Some(targets);
        }
        if let Some(columns) = self.outlier_columns {
            config.outlier_columns = Some(columns);
        }
        if let Some((key, targets)) = self.partition {
            config.partition_key = Some(key);
            config.partition_targets = targets;
        }
        if let Some(threshold) = self.partition_drop_threshold {
            config.partition_drop_threshold = threshold;
        }
        if let Some((key, fetch_time)) = self.dedupe {
            config.dedupe_key = Some(key);
            config.fetch_time_column = fetch_time;
        }
        if let Some(remove) = self.remove_duplicates {
            config.remove_duplicates = remove;
        }
        if let Some(k) = self.knn_max_neighbors {
            config.knn_max_neighbors = k;
        }
        if let Some(max_iter) = self.iterative_max_iter {
            config.iterative_max_iter = max_iter;
        }
        if let Some(seed) = self.iterative_seed {
            config.iterative_seed = seed;
        }
        if let Some(options) = self.parse_options {
            config.parse_options = options;
        }
        if let Some(normalize) = self.normalize_column_names {
            config.normalize_column_names = normalize;
        }

        config.validate()?;
        Ok(config)
    }
}
