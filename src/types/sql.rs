use serde::{Deserialize, Serialize};

/// Relational type codes, numbered like JDBC's `java.sql.Types`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Date,
    Time,
    Timestamp,
    Binary,
    Varbinary,
    Blob,
    Clob,
    Other,
}

impl SqlType {
    pub fn code(&self) -> i32 {
        match self {
            SqlType::Bit => -7,
            SqlType::Boolean => 16,
            SqlType::TinyInt => -6,
            SqlType::SmallInt => 5,
            SqlType::Integer => 4,
            SqlType::BigInt => -5,
            SqlType::Real => 7,
            SqlType::Float => 6,
            SqlType::Double => 8,
            SqlType::Numeric => 2,
            SqlType::Decimal => 3,
            SqlType::Char => 1,
            SqlType::Varchar => 12,
            SqlType::LongVarchar => -1,
            SqlType::Date => 91,
            SqlType::Time => 92,
            SqlType::Timestamp => 93,
            SqlType::Binary => -2,
            SqlType::Varbinary => -3,
            SqlType::Blob => 2004,
            SqlType::Clob => 2005,
            SqlType::Other => 1111,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SqlType::Bit => "bit",
            SqlType::Boolean => "boolean",
            SqlType::TinyInt => "tinyint",
            SqlType::SmallInt => "smallint",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Real => "real",
            SqlType::Float => "float",
            SqlType::Double => "double",
            SqlType::Numeric => "numeric",
            SqlType::Decimal => "decimal",
            SqlType::Char => "char",
            SqlType::Varchar => "varchar",
            SqlType::LongVarchar => "longvarchar",
            SqlType::Date => "date",
            SqlType::Time => "time",
            SqlType::Timestamp => "timestamp",
            SqlType::Binary => "binary",
            SqlType::Varbinary => "varbinary",
            SqlType::Blob => "blob",
            SqlType::Clob => "clob",
            SqlType::Other => "other",
        }
    }

    /// Integral numeric types, the ones counter-style generators can fill
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    /// Decimal types that accept integral generator values
    pub fn is_numeric(&self) -> bool {
        self.is_integral() || matches!(self, SqlType::Numeric | SqlType::Decimal)
    }
}
