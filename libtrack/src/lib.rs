// Copyright 2026 The Lib-Track Project
// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod config;
pub mod conversation;
pub mod guide;
pub mod http;
pub mod message;
pub mod notify;
pub mod reconcile;
pub mod stream;
