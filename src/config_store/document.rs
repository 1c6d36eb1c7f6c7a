use indexmap::IndexMap;

/// A value stored in a config document
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Single-line array of scalars
    Array(Vec<ConfigValue>),
    Table(ConfigDocument),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&ConfigDocument> {
        match self {
            ConfigValue::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, ConfigValue::Table(_))
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<ConfigDocument> for ConfigValue {
    fn from(value: ConfigDocument) -> Self {
        ConfigValue::Table(value)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(value: Vec<T>) -> Self {
        ConfigValue::Array(value.into_iter().map(Into::into).collect())
    }
}

/// Ordered mapping of keys to values; nested tables are documents too.
///
/// Equality ignores key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    entries: IndexMap<String, ConfigValue>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigValue> {
        self.entries.get_mut(key)
    }

    /// Insert or replace a value, keeping the key's original position
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Option<ConfigValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove a key, keeping the order of the remaining entries
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.entries.iter()
    }

    pub fn table(&self, key: &str) -> Option<&ConfigDocument> {
        self.get(key).and_then(ConfigValue::as_table)
    }

    pub fn table_mut(&mut self, key: &str) -> Option<&mut ConfigDocument> {
        match self.entries.get_mut(key) {
            Some(ConfigValue::Table(t)) => Some(t),
            _ => None,
        }
    }

    /// Get the table stored under `key`, creating it if absent.
    ///
    /// Returns `None` when `key` already holds a non-table value.
    pub fn ensure_table(&mut self, key: &str) -> Option<&mut ConfigDocument> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| ConfigValue::Table(ConfigDocument::new()))
        {
            ConfigValue::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Non-table entries, in order
    pub fn scalars(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.entries.iter().filter(|(_, v)| !v.is_table())
    }

    /// Table entries, in order
    pub fn tables(&self) -> impl Iterator<Item = (&String, &ConfigDocument)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_table().map(|t| (k, t)))
    }
}
