// routemarket-memory: in-memory storage adapter for RouteMarket.
//
// HashMap-backed store for tests, prototyping and single-process deployments.

pub mod adapter;

pub use adapter::MemoryAdapter;
