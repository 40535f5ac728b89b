// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;

/// Source of the bearer token sent with every request to the utility.
#[derive(Clone, Default)]
pub enum AccessTokenFactory {
    #[default]
    None,
    Static(String),
}

impl AccessTokenFactory {
    pub fn get_access_token(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Static(access_token) => Some(access_token),
        }
    }
}

impl From<Option<String>> for AccessTokenFactory {
    fn from(access_token: Option<String>) -> Self {
        match access_token {
            Some(access_token) => Self::Static(access_token),
            None => Self::None,
        }
    }
}

impl Debug for AccessTokenFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "AccessTokenFactory::None"),
            Self::Static(_) => write!(f, "AccessTokenFactory::Static(<redacted>)"),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use crate::access_token::AccessTokenFactory;

    #[test]
    fn from_configured_token() {
        let factory = AccessTokenFactory::from(Some("mock-token".to_string()));
        assert_eq!(factory.get_access_token(), Some("mock-token"));
    }

    #[test]
    fn from_missing_token() {
        let factory = AccessTokenFactory::from(None);
        assert_eq!(factory.get_access_token(), None);
    }

    #[test]
    fn debug_does_not_leak_the_token() {
        let factory = AccessTokenFactory::from(Some("secret".to_string()));
        assert!(!format!("{factory:?}").contains("secret"));
    }
}
