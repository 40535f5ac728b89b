// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod reqwest_adapter;
pub mod server;

pub use server::{build_tls_acceptor, TlsError};
pub use tokio_rustls::TlsAcceptor;
