//! Kinds claimed by the builtin dialect. Kinds are scoped per dialect, so
//! other dialects may reuse these numbers for their own classes.

pub mod types {
    pub const NONE: u32 = 0;
    pub const INDEX: u32 = 1;
    pub const INTEGER: u32 = 2;
    pub const F16: u32 = 3;
    pub const F32: u32 = 4;
    pub const F64: u32 = 5;
    pub const FUNCTION: u32 = 6;
}

pub mod attributes {
    pub const UNIT: u32 = 0;
    pub const INTEGER: u32 = 1;
    pub const FLOAT: u32 = 2;
    pub const STRING: u32 = 3;
    pub const ARRAY: u32 = 4;
    pub const DICTIONARY: u32 = 5;
    pub const TYPE: u32 = 6;
    pub const SYMBOL_REF: u32 = 7;
    pub const CALLBACK: u32 = 8;
}
