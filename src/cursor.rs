//! Cursors: what a request hands back to the caller.

use oxbow_types::{DataChunk, Value};

use crate::error::{EngineError, ErrorCode};

/// Result of one engine request: a data chunk, a bare success (with an
/// affected-row count), or an error `{ code, message }`.
#[derive(Debug)]
pub struct Cursor {
    chunk: DataChunk,
    affected: u64,
    error: Option<EngineError>,
    position: i64,
}

impl Cursor {
    pub fn from_chunk(chunk: DataChunk) -> Self {
        Cursor {
            affected: chunk.cardinality() as u64,
            chunk,
            error: None,
            position: -1,
        }
    }

    pub fn success(affected: u64) -> Self {
        Cursor {
            chunk: DataChunk::empty(),
            affected,
            error: None,
            position: -1,
        }
    }

    pub fn from_error(error: EngineError) -> Self {
        Cursor {
            chunk: DataChunk::empty(),
            affected: 0,
            error: Some(error),
            position: -1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error.as_ref().map(|e| e.code).unwrap_or(ErrorCode::None)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Rows in the result chunk.
    pub fn size(&self) -> usize {
        self.chunk.cardinality()
    }

    /// Rows touched by a write request.
    pub fn affected_rows(&self) -> u64 {
        self.affected
    }

    pub fn chunk(&self) -> &DataChunk {
        &self.chunk
    }

    // -- iteration --------------------------------------------------------

    pub fn has_next(&self) -> bool {
        self.position + 1 < self.chunk.cardinality() as i64
    }

    pub fn advance(&mut self) -> bool {
        if self.has_next() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn current_index(&self) -> i64 {
        self.position
    }

    pub fn current_value(&self, column: usize) -> Value {
        if self.position < 0 {
            return Value::Null;
        }
        self.chunk.value(column, self.position as usize)
    }
}

impl From<Result<Cursor, EngineError>> for Cursor {
    fn from(result: Result<Cursor, EngineError>) -> Self {
        match result {
            Ok(cursor) => cursor,
            Err(error) => Cursor::from_error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::LogicalType;

    #[test]
    fn success_and_error_discrimination() {
        let ok = Cursor::success(3);
        assert!(ok.is_success());
        assert!(!ok.is_error());
        assert_eq!(ok.error_code(), ErrorCode::None);
        assert_eq!(ok.affected_rows(), 3);

        let err = Cursor::from_error(EngineError::new(
            ErrorCode::CollectionNotExists,
            "missing",
        ));
        assert!(err.is_error());
        assert_eq!(err.error_code(), ErrorCode::CollectionNotExists);
        assert_eq!(err.error_message(), Some("missing"));
    }

    #[test]
    fn iteration_over_chunk() {
        let mut chunk = DataChunk::new(&[LogicalType::Int64]);
        for i in 0..3 {
            chunk.push_row(vec![Value::Int64(i)]).unwrap();
        }
        let mut cursor = Cursor::from_chunk(chunk);
        assert_eq!(cursor.size(), 3);
        let mut seen = Vec::new();
        while cursor.advance() {
            seen.push(cursor.current_value(0));
        }
        assert_eq!(
            seen,
            vec![Value::Int64(0), Value::Int64(1), Value::Int64(2)]
        );
    }
}
