// Copyright 2026 The Tollgate Project
// SPDX-License-Identifier: Apache-2.0

pub mod auth;
pub mod config;
pub mod conversation;
pub mod server;
pub mod stream;
pub mod turn;
pub mod upstream;
