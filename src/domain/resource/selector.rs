// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

/// Identifies the resource(s) a verb targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Name(String),
    /// Kubernetes label selector expression, e.g. `app=web,tier!=cache`
    Labels(String),
    All,
}

impl Selector {
    pub fn name(name: impl Into<String>) -> Self {
        Selector::Name(name.into())
    }

    pub fn labels(expr: impl Into<String>) -> Self {
        Selector::Labels(expr.into())
    }

    /// Selector verbs resolve to zero or more targets; names to exactly one.
    pub fn is_multi_target(&self) -> bool {
        !matches!(self, Selector::Name(_))
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Selector::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn label_expr(&self) -> Option<&str> {
        match self {
            Selector::Labels(expr) => Some(expr),
            _ => None,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Name(name) => f.write_str(name),
            Selector::Labels(expr) => write!(f, "-l {}", expr),
            Selector::All => f.write_str("--all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_target() {
        assert!(!Selector::name("web").is_multi_target());
        assert!(Selector::labels("app=web").is_multi_target());
        assert!(Selector::All.is_multi_target());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Selector::name("web").as_name(), Some("web"));
        assert_eq!(Selector::labels("app=web").label_expr(), Some("app=web"));
        assert_eq!(Selector::All.as_name(), None);
    }
}
