// Network Model - the in-memory container every pass mutates
//
// - Value: one attribute cell
// - ComponentTable / Entity: static attributes keyed by identifier
// - TimeSeries: time-indexed attribute, one column per entity
// - Network: tables + series + shared time axis + reference schema

pub mod network;
pub mod series;
pub mod table;
pub mod value;

pub use network::{
    default_references, Network, ReferenceSpec, BUSES, CARRIERS, GENERATORS, LINES, LINKS, LOADS,
    STORAGE_UNITS, STORES,
};
pub use series::TimeSeries;
pub use table::{ComponentTable, Entity};
pub use value::Value;
