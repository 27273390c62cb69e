// src/services/mod.rs

pub mod grading;
pub mod ordering;
