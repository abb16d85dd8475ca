//! Utility functions and types

pub mod data_loader;

pub use data_loader::{column_names, column_to_array1, column_to_vec, columns_to_array2, DataLoader, DataSaver};
