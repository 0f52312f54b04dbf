//! Lazy, forward-only result streams.
//!
//! A query result travels from the store as a header (column metadata) and a
//! sequence of protobuf-encoded rows. `ResultSet` decodes one row per
//! `advance()` and never rewinds. A result set that backs a single-use read
//! also owns the pooled session of that read and hands it back to the pool
//! as soon as the stream is exhausted, closed or dropped.
//!
//! # Cursor states
//!
//! ```text
//! Ready --advance()--> Positioned --advance()--> ... --> Exhausted
//!   \                      |
//!    `---- close() --------+-----------------------> Closed
//! ```
//!
//! `Exhausted` and `Closed` are terminal: `advance()` keeps returning `false`.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;

use prost::Message;
use prost_types::value::Kind;

use crate::error::ClientError;
use crate::session::PooledSession;
use crate::statement::Value;

/// Column type as declared in the result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Bool,
    Int64,
    Float64,
    String,
    Bytes,
    Timestamp,
    Date,
}

/// One column of a result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub type_code: TypeCode,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
        }
    }
}

/// Logical content of a statement result: columns, rows and, for DML, the
/// exact number of affected rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSetData {
    pub fields: Vec<Field>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: Option<i64>,
}

impl ResultSetData {
    /// An empty query result with the given columns.
    #[must_use]
    pub const fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            rows: Vec::new(),
            row_count: None,
        }
    }

    /// The result of a DML statement.
    #[must_use]
    pub const fn update_count(row_count: i64) -> Self {
        Self {
            fields: Vec::new(),
            rows: Vec::new(),
            row_count: Some(row_count),
        }
    }

    /// Append a row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    /// Encode the rows for transfer.
    #[must_use]
    pub fn encode(&self) -> EncodedResultSet {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                prost_types::ListValue {
                    values: row.iter().map(encode_value).collect(),
                }
                .encode_to_vec()
            })
            .collect();
        EncodedResultSet {
            fields: self.fields.iter().cloned().collect(),
            rows,
            row_count: self.row_count,
        }
    }
}

/// A statement result as it travels over the RPC boundary.
///
/// Each row is an encoded `google.protobuf.ListValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResultSet {
    pub fields: Arc<[Field]>,
    pub rows: VecDeque<Vec<u8>>,
    pub row_count: Option<i64>,
}

/// Encode a parameter-style value the way the store encodes cells:
/// 64-bit integers travel as decimal strings, bytes as lowercase hex.
#[must_use]
pub fn encode_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(v) => Kind::BoolValue(*v),
        Value::Int64(v) => Kind::StringValue(v.to_string()),
        Value::Float64(v) => Kind::NumberValue(*v),
        Value::String(v) => Kind::StringValue(v.clone()),
        Value::Bytes(v) => Kind::StringValue(v.iter().fold(String::new(), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })),
    };
    prost_types::Value { kind: Some(kind) }
}

/// Anything that can address a column of a row.
pub trait ColumnIndex {
    fn resolve(&self, fields: &[Field]) -> Result<usize, ClientError>;
}

impl ColumnIndex for usize {
    fn resolve(&self, fields: &[Field]) -> Result<usize, ClientError> {
        if *self < fields.len() {
            Ok(*self)
        } else {
            Err(ClientError::Decode(format!(
                "column index {self} out of range ({} columns)",
                fields.len()
            )))
        }
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, fields: &[Field]) -> Result<usize, ClientError> {
        fields
            .iter()
            .position(|field| field.name == *self)
            .ok_or_else(|| ClientError::Decode(format!("no column named {self}")))
    }
}

/// A decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Arc<[Field]>,
    values: Vec<prost_types::Value>,
}

impl Row {
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn kind(&self, column: &impl ColumnIndex) -> Result<&Kind, ClientError> {
        let index = column.resolve(&self.fields)?;
        self.values
            .get(index)
            .and_then(|value| value.kind.as_ref())
            .ok_or_else(|| ClientError::Decode(format!("column {index} has no value")))
    }

    pub fn is_null(&self, column: impl ColumnIndex) -> Result<bool, ClientError> {
        Ok(matches!(self.kind(&column)?, Kind::NullValue(_)))
    }

    pub fn get_i64(&self, column: impl ColumnIndex) -> Result<i64, ClientError> {
        match self.kind(&column)? {
            Kind::StringValue(s) => s
                .parse::<i64>()
                .map_err(|e| ClientError::Decode(format!("'{s}' is not an INT64: {e}"))),
            other => Err(unexpected("INT64", other)),
        }
    }

    pub fn get_f64(&self, column: impl ColumnIndex) -> Result<f64, ClientError> {
        match self.kind(&column)? {
            Kind::NumberValue(n) => Ok(*n),
            Kind::StringValue(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => Err(ClientError::Decode(format!("'{s}' is not a FLOAT64"))),
            },
            other => Err(unexpected("FLOAT64", other)),
        }
    }

    pub fn get_bool(&self, column: impl ColumnIndex) -> Result<bool, ClientError> {
        match self.kind(&column)? {
            Kind::BoolValue(b) => Ok(*b),
            other => Err(unexpected("BOOL", other)),
        }
    }

    pub fn get_string(&self, column: impl ColumnIndex) -> Result<String, ClientError> {
        match self.kind(&column)? {
            Kind::StringValue(s) => Ok(s.clone()),
            other => Err(unexpected("STRING", other)),
        }
    }
}

fn unexpected(expected: &str, actual: &Kind) -> ClientError {
    let actual = match actual {
        Kind::NullValue(_) => "NULL",
        Kind::NumberValue(_) => "number",
        Kind::StringValue(_) => "string",
        Kind::BoolValue(_) => "bool",
        Kind::StructValue(_) => "struct",
        Kind::ListValue(_) => "list",
    };
    ClientError::Decode(format!("expected {expected}, found {actual}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Ready,
    Positioned,
    Exhausted,
    Closed,
}

/// Forward-only cursor over the rows of a query.
///
/// Always release a result set: call `close()`, read it to the end, or let
/// it go out of scope. Any of the three frees the backing session of a
/// single-use read.
#[derive(Debug)]
pub struct ResultSet {
    fields: Arc<[Field]>,
    pending: VecDeque<Vec<u8>>,
    current: Option<Row>,
    row_count: Option<i64>,
    state: CursorState,
    session: Option<PooledSession>,
}

impl ResultSet {
    /// A result set whose rows belong to an attempt or a read-only transaction.
    #[must_use]
    pub fn new(encoded: EncodedResultSet) -> Self {
        Self {
            fields: encoded.fields,
            pending: encoded.rows,
            current: None,
            row_count: encoded.row_count,
            state: CursorState::Ready,
            session: None,
        }
    }

    /// A result set that owns the session of a single-use read.
    #[must_use]
    pub(crate) fn with_session(encoded: EncodedResultSet, session: PooledSession) -> Self {
        let mut result_set = Self::new(encoded);
        result_set.session = Some(session);
        result_set
    }

    /// Move to the next row.
    ///
    /// Returns `Ok(false)` once the stream is exhausted or closed, and keeps
    /// doing so on every later call.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Decode` if a row cannot be decoded. The stream is
    /// closed in that case.
    pub fn advance(&mut self) -> Result<bool, ClientError> {
        if matches!(self.state, CursorState::Exhausted | CursorState::Closed) {
            return Ok(false);
        }

        let Some(bytes) = self.pending.pop_front() else {
            self.state = CursorState::Exhausted;
            self.current = None;
            self.session = None;
            return Ok(false);
        };

        match self.decode_row(&bytes) {
            Ok(row) => {
                self.current = Some(row);
                self.state = CursorState::Positioned;
                Ok(true)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn decode_row(&self, bytes: &[u8]) -> Result<Row, ClientError> {
        let list = prost_types::ListValue::decode(bytes)
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        if list.values.len() != self.fields.len() {
            return Err(ClientError::Decode(format!(
                "row has {} values but metadata declares {} columns",
                list.values.len(),
                self.fields.len()
            )));
        }
        Ok(Row {
            fields: Arc::clone(&self.fields),
            values: list.values,
        })
    }

    /// The row under the cursor, if positioned.
    #[must_use]
    pub const fn current_row(&self) -> Option<&Row> {
        self.current.as_ref()
    }

    fn positioned(&self) -> Result<&Row, ClientError> {
        self.current
            .as_ref()
            .ok_or_else(|| ClientError::invalid_state("result set is not positioned on a row"))
    }

    pub fn get_i64(&self, column: impl ColumnIndex) -> Result<i64, ClientError> {
        self.positioned()?.get_i64(column)
    }

    pub fn get_string(&self, column: impl ColumnIndex) -> Result<String, ClientError> {
        self.positioned()?.get_string(column)
    }

    pub fn get_bool(&self, column: impl ColumnIndex) -> Result<bool, ClientError> {
        self.positioned()?.get_bool(column)
    }

    pub fn get_f64(&self, column: impl ColumnIndex) -> Result<f64, ClientError> {
        self.positioned()?.get_f64(column)
    }

    pub fn is_null(&self, column: impl ColumnIndex) -> Result<bool, ClientError> {
        self.positioned()?.is_null(column)
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Exact affected-row count for DML results.
    #[must_use]
    pub const fn row_count(&self) -> Option<i64> {
        self.row_count
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, CursorState::Closed)
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self.state, CursorState::Exhausted)
    }

    /// Release the stream. Idempotent.
    pub fn close(&mut self) {
        if self.state != CursorState::Closed {
            self.state = CursorState::Closed;
            self.pending.clear();
            self.current = None;
            self.session = None;
        }
    }

    /// Drain the remaining rows.
    ///
    /// # Errors
    ///
    /// Returns the first decode error.
    pub fn collect_rows(mut self) -> Result<Vec<Row>, ClientError> {
        let mut rows = Vec::with_capacity(self.pending.len());
        while self.advance()? {
            if let Some(row) = self.current.take() {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        self.close();
    }
}
