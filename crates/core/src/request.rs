//! Wire request built from settled [`QueryParams`].

use serde::Serialize;

use crate::types::{ApiVariant, QueryParams};

/// One GET request to the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub params: QueryParams,
    pub variant: ApiVariant,
}

impl SearchRequest {
    pub fn new(params: QueryParams, variant: ApiVariant) -> Self {
        Self { params, variant }
    }

    /// Query-string pairs in wire order. Values are unencoded; the transport
    /// percent-encodes them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let p = &self.params;
        let mut pairs = vec![
            ("search", p.search_term.clone()),
            ("optimized", p.fast.to_string()),
            ("limit", p.limit.to_string()),
            ("threshold", p.threshold.to_string()),
        ];
        if self.variant == ApiVariant::Extended {
            pairs.push(("speed", p.speed.to_string()));
            pairs.push(("dataset", p.dataset.clone()));
        }
        pairs
    }
}
