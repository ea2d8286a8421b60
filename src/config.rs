use serde::{Deserialize, Serialize};

pub const DEFAULT_REPOSITORY: &str = "default";
pub const DEFAULT_STRING_LENGTH: usize = 50;
pub const DEFAULT_TEXT_LENGTH: usize = 65_535;

/// Mapper configuration
///
/// Names the repository that resources are scoped to and supplies the
/// type-level defaults that built-in property types start from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Repository name; identity maps are scoped per repository
    pub repository: String,

    /// Default maximum length of `String` properties
    pub string_length: usize,

    /// Default maximum length of `Text` properties
    pub text_length: usize,

    /// Default maximum length of `Binary` properties
    pub binary_length: usize,

    /// Emit a debug log line for every state transition
    pub log_transitions: bool,
}

impl MapperConfig {
    /// Create a configuration for the named repository
    pub fn new(repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
            string_length: DEFAULT_STRING_LENGTH,
            text_length: DEFAULT_TEXT_LENGTH,
            binary_length: DEFAULT_STRING_LENGTH,
            log_transitions: false,
        }
    }

    /// Set the default `String` length
    pub fn string_length(mut self, length: usize) -> Self {
        self.string_length = length;
        self
    }

    /// Set the default `Text` length
    pub fn text_length(mut self, length: usize) -> Self {
        self.text_length = length;
        self
    }

    /// Set the default `Binary` length
    pub fn binary_length(mut self, length: usize) -> Self {
        self.binary_length = length;
        self
    }

    /// Toggle transition logging
    pub fn log_transitions(mut self, enabled: bool) -> Self {
        self.log_transitions = enabled;
        self
    }

    /// Parse from a configuration string
    ///
    /// Format: "memomapper://repository?string_length=100&text_length=4096"
    ///
    /// # Examples
    ///
    /// ```
    /// use memomapper::MapperConfig;
    ///
    /// let config = MapperConfig::from_url("memomapper://archive?string_length=80").unwrap();
    /// assert_eq!(config.repository, "archive");
    /// assert_eq!(config.string_length, 80);
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let Some(rest) = url.strip_prefix("memomapper://") else {
            return Err("URL must start with 'memomapper://'".to_string());
        };

        let (repository, query) = match rest.split_once('?') {
            Some((repository, query)) => (repository, Some(query)),
            None => (rest, None),
        };

        let mut config = Self::new(repository);

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            let Some((name, value)) = pair.split_once('=') else {
                return Err(format!("Invalid parameter '{}'", pair));
            };
            match name {
                "string_length" => config.string_length = parse_length(name, value)?,
                "text_length" => config.text_length = parse_length(name, value)?,
                "binary_length" => config.binary_length = parse_length(name, value)?,
                "log_transitions" => {
                    config.log_transitions = value
                        .parse()
                        .map_err(|_| format!("Invalid boolean for '{}'", name))?
                }
                other => return Err(format!("Unknown parameter '{}'", other)),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert to configuration string
    pub fn to_url(&self) -> String {
        format!(
            "memomapper://{}?string_length={}&text_length={}&binary_length={}&log_transitions={}",
            self.repository,
            self.string_length,
            self.text_length,
            self.binary_length,
            self.log_transitions
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.repository.is_empty() {
            return Err("Repository name cannot be empty".to_string());
        }

        if self.string_length == 0 || self.text_length == 0 || self.binary_length == 0 {
            return Err("Default lengths must be > 0".to_string());
        }

        Ok(())
    }
}

fn parse_length(name: &str, value: &str) -> Result<usize, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid length for '{}'", name))
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REPOSITORY)
    }
}
