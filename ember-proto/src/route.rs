/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! `nodeType.handlerName.methodName[@serverId]` route parsing, with the
//! `handlerName` segment optional: `nodeType.methodName[@serverId]` is also
//! a valid route, for a method that isn't namespaced under a handler.

use std::fmt;

use crate::errors::{ProtoError, ProtoResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub node_type: String,
    /// Empty when the route was parsed from its two-segment form.
    pub handler: String,
    pub method: String,
    pub server_id: Option<String>,
}

impl Route {
    pub fn new(node_type: impl Into<String>, handler: impl Into<String>, method: impl Into<String>) -> Self {
        Route { node_type: node_type.into(), handler: handler.into(), method: method.into(), server_id: None }
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    /// A route is local iff its node type matches this process's own node type.
    pub fn is_local(&self, own_node_type: &str) -> bool {
        self.node_type == own_node_type
    }

    /// Total on `ident ('.' ident){1,2} ('@' ident)?`: two segments
    /// (`nodeType.method`) or three (`nodeType.handler.method`), each an
    /// identifier, plus an optional `@serverId` suffix.
    pub fn parse(s: &str) -> ProtoResult<Route> {
        let (body, server_id) = match s.split_once('@') {
            Some((body, id)) => (body, Some(id)),
            None => (s, None),
        };
        if let Some(id) = server_id {
            if id.is_empty() || !is_ident(id) {
                return Err(ProtoError::RouteParse(format!("bad server id in '{s}'")));
            }
        }

        let segments: Vec<&str> = body.split('.').collect();
        if segments.len() < 2 || segments.len() > 3 {
            return Err(ProtoError::RouteParse(format!("expected 2 or 3 dotted route segments in '{s}'")));
        }
        if !segments.iter().all(|seg| is_ident(seg)) {
            return Err(ProtoError::RouteParse(format!("empty or invalid route segment in '{s}'")));
        }

        let (node_type, handler, method) = match segments.as_slice() {
            [node_type, method] => (*node_type, "", *method),
            [node_type, handler, method] => (*node_type, *handler, *method),
            _ => unreachable!("length already checked to be 2 or 3"),
        };

        Ok(Route { node_type: node_type.to_string(), handler: handler.to_string(), method: method.to_string(), server_id: server_id.map(str::to_string) })
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.handler.is_empty() {
            write!(f, "{}.{}", self.node_type, self.method)?;
        } else {
            write!(f, "{}.{}.{}", self.node_type, self.handler, self.method)?;
        }
        if let Some(id) = &self.server_id {
            write!(f, "@{id}")?;
        }
        Ok(())
    }
}
