//! Native column types and their mapping into the engine type system.
//!
//! Drivers report column types as JDBC `java.sql.Types` codes together with
//! the declared size (character length or numeric precision) and, for exact
//! numerics, the number of fractional digits. [`map_type`] turns that into an
//! [`EngineType`] or `None` when the engine has no representation for it.

use std::fmt;

use arrow::datatypes::{DataType, TimeUnit};

/// JDBC `java.sql.Types` codes.
pub mod jdbc {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const FLOAT: i32 = 6;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const NCHAR: i32 = -15;
    pub const NVARCHAR: i32 = -9;
    pub const LONGNVARCHAR: i32 = -16;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const LONGVARBINARY: i32 = -4;
    pub const BOOLEAN: i32 = 16;
    pub const OTHER: i32 = 1111;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const STRUCT: i32 = 2002;
    pub const ARRAY: i32 = 2003;
    pub const TIME_WITH_TIMEZONE: i32 = 2013;
    pub const TIMESTAMP_WITH_TIMEZONE: i32 = 2014;
}

/// Largest precision an engine decimal can carry.
pub const MAX_DECIMAL_PRECISION: u8 = 38;

/// Declared size of a native column as reported by catalog metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeclaredSize {
    /// Character length, or total digits for exact numerics.
    pub size: i32,
    /// Fractional digits for exact numerics, when the catalog reports them.
    pub decimal_digits: Option<i32>,
}

impl DeclaredSize {
    pub fn new(size: i32) -> Self {
        Self {
            size,
            decimal_digits: None,
        }
    }

    pub fn with_scale(size: i32, decimal_digits: i32) -> Self {
        Self {
            size,
            decimal_digits: Some(decimal_digits),
        }
    }
}

/// Logical column types exposed to the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: i8 },
    Char(u32),
    /// Bounded when a length is known, unbounded otherwise.
    Varchar(Option<u32>),
    Varbinary,
    Date,
    Time,
    Timestamp,
}

impl EngineType {
    /// The Arrow type DataFusion uses for values of this column.
    pub fn arrow_type(&self) -> DataType {
        match self {
            EngineType::Boolean => DataType::Boolean,
            EngineType::TinyInt => DataType::Int8,
            EngineType::SmallInt => DataType::Int16,
            EngineType::Integer => DataType::Int32,
            EngineType::BigInt => DataType::Int64,
            EngineType::Real => DataType::Float32,
            EngineType::Double => DataType::Float64,
            EngineType::Decimal { precision, scale } => DataType::Decimal128(*precision, *scale),
            EngineType::Char(_) | EngineType::Varchar(_) => DataType::Utf8,
            EngineType::Varbinary => DataType::Binary,
            EngineType::Date => DataType::Date32,
            EngineType::Time => DataType::Time64(TimeUnit::Microsecond),
            EngineType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineType::Boolean => write!(f, "boolean"),
            EngineType::TinyInt => write!(f, "tinyint"),
            EngineType::SmallInt => write!(f, "smallint"),
            EngineType::Integer => write!(f, "integer"),
            EngineType::BigInt => write!(f, "bigint"),
            EngineType::Real => write!(f, "real"),
            EngineType::Double => write!(f, "double"),
            EngineType::Decimal { precision, scale } => write!(f, "decimal({},{})", precision, scale),
            EngineType::Char(len) => write!(f, "char({})", len),
            EngineType::Varchar(Some(len)) => write!(f, "varchar({})", len),
            EngineType::Varchar(None) => write!(f, "varchar"),
            EngineType::Varbinary => write!(f, "varbinary"),
            EngineType::Date => write!(f, "date"),
            EngineType::Time => write!(f, "time"),
            EngineType::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// Map a native type code and declared size to an engine type.
///
/// Returns `None` for codes the engine cannot represent. Callers drop such
/// columns; it is never an error.
pub fn map_type(type_code: i32, declared: DeclaredSize) -> Option<EngineType> {
    let length = u32::try_from(declared.size).unwrap_or(0);
    match type_code {
        jdbc::BIT | jdbc::BOOLEAN => Some(EngineType::Boolean),
        jdbc::TINYINT => Some(EngineType::TinyInt),
        jdbc::SMALLINT => Some(EngineType::SmallInt),
        jdbc::INTEGER => Some(EngineType::Integer),
        jdbc::BIGINT => Some(EngineType::BigInt),
        jdbc::REAL => Some(EngineType::Real),
        jdbc::FLOAT | jdbc::DOUBLE => Some(EngineType::Double),
        jdbc::NUMERIC | jdbc::DECIMAL => Some(decimal_type(declared)),
        jdbc::CHAR | jdbc::NCHAR => Some(EngineType::Char(length)),
        jdbc::VARCHAR | jdbc::NVARCHAR | jdbc::LONGVARCHAR | jdbc::LONGNVARCHAR => {
            Some(EngineType::Varchar((length > 0).then_some(length)))
        }
        jdbc::BINARY | jdbc::VARBINARY | jdbc::LONGVARBINARY => Some(EngineType::Varbinary),
        jdbc::DATE => Some(EngineType::Date),
        jdbc::TIME => Some(EngineType::Time),
        jdbc::TIMESTAMP => Some(EngineType::Timestamp),
        _ => None,
    }
}

/// Teradata `NUMBER` without a declared precision reports a size of 0 or
/// below. A negative scale means the scale floats per value, which no fixed
/// decimal can hold without rounding.
fn decimal_type(declared: DeclaredSize) -> EngineType {
    if declared.decimal_digits.is_some_and(|digits| digits < 0) {
        return EngineType::Double;
    }
    let precision = if declared.size <= 0 {
        MAX_DECIMAL_PRECISION
    } else {
        declared.size.min(MAX_DECIMAL_PRECISION as i32) as u8
    };
    let scale = declared
        .decimal_digits
        .unwrap_or(0)
        .clamp(0, precision as i32) as i8;
    EngineType::Decimal { precision, scale }
}
