//! Infrastructure layer - storage, repositories and services

pub mod approval;
pub mod logging;
pub mod services;
pub mod storage;
pub mod workflow;
