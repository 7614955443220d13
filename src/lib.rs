// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod consumer;

pub mod channel;
pub mod config;
pub mod errors;
pub mod handler;
pub mod policy;
pub mod queue;
pub mod session;
pub mod sink;

pub use consumer::StopReason;
