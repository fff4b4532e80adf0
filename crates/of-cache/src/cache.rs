use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use duckdb::types::Value;
use duckdb::{params_from_iter, Connection};
use of_types::{CacheError, LookupState, ParameterError};
use serde::{Deserialize, Serialize};

/// Encoded parameter tuple used as the cache key.
pub type CacheKey = BTreeMap<String, i64>;

/// Storage type of the result column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Real,
    Text,
}

impl ResultType {
    fn sql_type(&self) -> &'static str {
        match self {
            Self::Real => "DOUBLE",
            Self::Text => "VARCHAR",
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real => f.write_str("real"),
            Self::Text => f.write_str("text"),
        }
    }
}

impl FromStr for ResultType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "real" => Ok(Self::Real),
            "text" => Ok(Self::Text),
            other => Err(CacheError::InvalidResultType(other.to_string())),
        }
    }
}

/// A cached result value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CachedValue {
    Real(f64),
    Text(String),
}

impl CachedValue {
    pub fn result_type(&self) -> ResultType {
        match self {
            Self::Real(_) => ResultType::Real,
            Self::Text(_) => ResultType::Text,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Real(v) => serde_json::json!(v),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Convert a wire payload into a value of the given type.
    pub fn from_json(value: &serde_json::Value, result_type: ResultType) -> Result<Self, CacheError> {
        match (result_type, value) {
            (ResultType::Real, serde_json::Value::Number(n)) => n
                .as_f64()
                .map(Self::Real)
                .ok_or_else(|| CacheError::ValueType {
                    expected: result_type.to_string(),
                }),
            (ResultType::Text, serde_json::Value::String(s)) => Ok(Self::Text(s.clone())),
            _ => Err(CacheError::ValueType {
                expected: result_type.to_string(),
            }),
        }
    }

    fn to_sql(&self) -> Value {
        match self {
            Self::Real(v) => Value::Double(*v),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }

    fn from_sql(value: Value, result_type: ResultType) -> Result<Self, CacheError> {
        match (result_type, value) {
            (ResultType::Real, Value::Double(v)) => Ok(Self::Real(v)),
            (ResultType::Real, Value::Float(v)) => Ok(Self::Real(v as f64)),
            (ResultType::Text, Value::Text(s)) => Ok(Self::Text(s)),
            _ => Err(CacheError::ValueType {
                expected: result_type.to_string(),
            }),
        }
    }
}

/// A cache hit. Only completed runs are ever cached, so the state is always
/// [`LookupState::Completed`].
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRun {
    pub id: i64,
    pub value: CachedValue,
    pub state: LookupState,
}

fn db_error(e: duckdb::Error) -> CacheError {
    CacheError::Database {
        message: e.to_string(),
    }
}

/// Write-once exact-match cache backed by DuckDB.
///
/// The `lookup` table holds one column per parameter (the encoded value),
/// the run id and the result value, with a uniqueness constraint over the
/// parameter columns. Every statement runs in autocommit mode so a
/// successful [`ObjFunCache::set`] is durable.
pub struct ObjFunCache {
    connection: Connection,
    parameters: Vec<String>,
    result_type: ResultType,
    select_query: String,
    exists_query: String,
    insert_query: String,
    delete_query: String,
}

impl ObjFunCache {
    /// Open the cache file at `path`, creating it if it does not exist yet.
    ///
    /// An existing file must have exactly the expected columns.
    pub fn open<P, S>(path: P, parameters: &[S], result_type: ResultType) -> Result<Self, CacheError>
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        let path = path.as_ref();
        let parameters = Self::check_parameters(parameters)?;
        let existing = path.exists();
        let connection = Connection::open(path).map_err(db_error)?;
        let cache = Self::with_connection(connection, parameters, result_type);
        if existing {
            tracing::info!("checking cache {}", path.display());
            cache.check_schema()?;
        } else {
            tracing::info!("creating cache {}", path.display());
            cache.create_schema()?;
        }
        Ok(cache)
    }

    /// Create a cache that lives only as long as the returned value.
    pub fn in_memory<S: AsRef<str>>(parameters: &[S], result_type: ResultType) -> Result<Self, CacheError> {
        let parameters = Self::check_parameters(parameters)?;
        let connection = Connection::open_in_memory().map_err(db_error)?;
        let cache = Self::with_connection(connection, parameters, result_type);
        cache.create_schema()?;
        Ok(cache)
    }

    fn check_parameters<S: AsRef<str>>(parameters: &[S]) -> Result<Vec<String>, CacheError> {
        if parameters.is_empty() {
            return Err(CacheError::EmptyParameterSet);
        }
        let mut names: Vec<String> = parameters.iter().map(|p| p.as_ref().to_string()).collect();
        names.sort();
        for name in &names {
            let reserved = name.eq_ignore_ascii_case("id") || name.eq_ignore_ascii_case("value");
            if name.is_empty() || reserved || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(CacheError::SchemaMismatch {
                    message: ParameterError::InvalidName { name: name.clone() }.to_string(),
                });
            }
        }
        Ok(names)
    }

    fn with_connection(connection: Connection, parameters: Vec<String>, result_type: ResultType) -> Self {
        let matches: Vec<String> = parameters.iter().map(|p| format!("\"{p}\" = ?")).collect();
        let matches = matches.join(" AND ");
        let columns: Vec<String> = parameters.iter().map(|p| format!("\"{p}\"")).collect();
        let placeholders = vec!["?"; parameters.len() + 2].join(", ");

        Self {
            select_query: format!("SELECT id, value FROM lookup WHERE {matches}"),
            exists_query: format!("SELECT count(*) FROM lookup WHERE id = ? OR ({matches})"),
            insert_query: format!(
                "INSERT INTO lookup (id, {}, value) VALUES ({placeholders})",
                columns.join(", ")
            ),
            delete_query: format!("DELETE FROM lookup WHERE {matches}"),
            connection,
            parameters,
            result_type,
        }
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        let columns: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("\"{p}\" BIGINT NOT NULL"))
            .collect();
        let unique: Vec<String> = self.parameters.iter().map(|p| format!("\"{p}\"")).collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS lookup (
                id BIGINT PRIMARY KEY,
                {},
                value {},
                UNIQUE ({})
            );",
            columns.join(",\n                "),
            self.result_type.sql_type(),
            unique.join(", ")
        );
        self.connection.execute_batch(&sql).map_err(db_error)
    }

    fn check_schema(&self) -> Result<(), CacheError> {
        let mut stmt = self
            .connection
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns
                 WHERE table_name = 'lookup' ORDER BY ordinal_position",
            )
            .map_err(db_error)?;
        let columns: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_error)?
            .collect::<Result<_, _>>()
            .map_err(db_error)?;

        if columns.len() != self.parameters.len() + 2 {
            let message = format!(
                "number of parameters in cache does not match: expected {}, found {}",
                self.parameters.len(),
                columns.len().saturating_sub(2)
            );
            tracing::error!("{message}");
            return Err(CacheError::SchemaMismatch { message });
        }

        let mut missing = Vec::new();
        for expected in self.parameters.iter().map(String::as_str).chain(["id", "value"]) {
            if !columns.iter().any(|(name, _)| name == expected) {
                tracing::error!("column {expected} missing from cache");
                missing.push(expected.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(CacheError::SchemaMismatch {
                message: format!("missing columns {}", missing.join(", ")),
            });
        }

        let value_type = columns
            .iter()
            .find(|(name, _)| name == "value")
            .map(|(_, ty)| ty.as_str())
            .unwrap_or_default();
        if !value_type.eq_ignore_ascii_case(self.result_type.sql_type()) {
            let message = format!(
                "value column has type {value_type}, expected {}",
                self.result_type.sql_type()
            );
            tracing::error!("{message}");
            return Err(CacheError::SchemaMismatch { message });
        }
        Ok(())
    }

    /// The sorted parameter names making up a key.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn result_type(&self) -> ResultType {
        self.result_type
    }

    fn check_key(&self, key: &CacheKey) -> Result<Vec<Value>, CacheError> {
        // BTreeMap keys iterate in sorted order, same as self.parameters
        if !key.keys().eq(self.parameters.iter()) {
            return Err(CacheError::KeyMismatch {
                expected: self.parameters.clone(),
                actual: key.keys().cloned().collect(),
            });
        }
        Ok(key.values().map(|v| Value::BigInt(*v)).collect())
    }

    /// Look up the completed result stored for `key`.
    pub fn get(&self, key: &CacheKey) -> Result<CachedRun, CacheError> {
        let values = self.check_key(key)?;
        let row = self
            .connection
            .query_row(&self.select_query, params_from_iter(values), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Value>(1)?))
            });
        match row {
            Ok((id, value)) => Ok(CachedRun {
                id,
                value: CachedValue::from_sql(value, self.result_type)?,
                state: LookupState::Completed,
            }),
            Err(duckdb::Error::QueryReturnedNoRows) => Err(CacheError::NotFound),
            Err(e) => Err(db_error(e)),
        }
    }

    /// Store a completed result. Entries are write-once: a second entry with
    /// the same key or the same run id is rejected.
    pub fn set(&self, key: &CacheKey, id: i64, value: CachedValue) -> Result<(), CacheError> {
        let values = self.check_key(key)?;
        if value.result_type() != self.result_type {
            return Err(CacheError::ValueType {
                expected: self.result_type.to_string(),
            });
        }

        let mut lookup = vec![Value::BigInt(id)];
        lookup.extend(values.iter().cloned());
        let existing: i64 = self
            .connection
            .query_row(&self.exists_query, params_from_iter(lookup), |row| row.get(0))
            .map_err(db_error)?;
        if existing > 0 {
            return Err(CacheError::DuplicateEntry);
        }

        let mut row = vec![Value::BigInt(id)];
        row.extend(values);
        row.push(value.to_sql());
        self.connection
            .execute(&self.insert_query, params_from_iter(row))
            .map_err(|e| {
                if e.to_string().to_lowercase().contains("constraint") {
                    CacheError::DuplicateEntry
                } else {
                    db_error(e)
                }
            })?;
        tracing::debug!("cached run {id}");
        Ok(())
    }

    /// Replace the entry for `key` after its result was overwritten remotely.
    ///
    /// The delete and the insert commit separately; an interruption in
    /// between leaves the key absent, which only costs a remote lookup.
    pub fn replace(&self, key: &CacheKey, id: i64, value: CachedValue) -> Result<(), CacheError> {
        let values = self.check_key(key)?;
        self.connection
            .execute(&self.delete_query, params_from_iter(values))
            .map_err(db_error)?;
        self.set(key, id, value)
    }

    /// Number of cached entries.
    pub fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .connection
            .query_row("SELECT count(*) FROM lookup", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

impl fmt::Debug for ObjFunCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjFunCache")
            .field("parameters", &self.parameters)
            .field("result_type", &self.result_type)
            .finish_non_exhaustive()
    }
}
