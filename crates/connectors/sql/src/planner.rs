//! Splits one logical query into independently readable partitions.

use crate::client::{Connection, DatabaseClient};
use crate::split::{count_query, PartitionSpec};
use igloo_common::{Error, Result, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Job-level inputs to planning. Immutable once planning starts.
#[derive(Debug, Clone, Default)]
pub struct PlanningConfig {
    pub input_query: Option<String>,
    /// Query supplied by the surrounding framework, used when no input
    /// query is configured.
    pub fallback_query: Option<String>,
    /// Either a discovery query or a comma separated literal list.
    pub params: Option<String>,
    /// Parameter lists supplied directly by the caller.
    pub parameters: Option<Vec<Vec<Value>>>,
    /// Columns used to order the base query before it is paged.
    pub order_by: Option<String>,
}

impl PlanningConfig {
    pub fn new(input_query: impl Into<String>) -> Self {
        Self { input_query: Some(input_query.into()), ..Default::default() }
    }

    pub fn with_fallback_query(mut self, query: impl Into<String>) -> Self {
        self.fallback_query = Some(query.into());
        self
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Vec<Value>>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_order_by(mut self, columns: impl Into<String>) -> Self {
        self.order_by = Some(columns.into());
        self
    }

    /// Resolves the query every split is derived from.
    ///
    /// The first non-blank of the input and fallback queries wins. Trailing
    /// semicolons are dropped since the query is wrapped in sub-selects.
    pub fn base_query(&self) -> Result<String> {
        [self.input_query.as_deref(), self.fallback_query.as_deref()]
            .into_iter()
            .flatten()
            .map(|q| q.trim().trim_end_matches(';').trim_end())
            .find(|q| !q.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::configuration("no input query configured"))
    }
}

/// How a planning run derives its splits, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum SplitStrategy {
    /// Run a discovery query; every returned row becomes one split's
    /// bind values.
    QueryDerived(String),
    /// One single-value split per entry of a comma separated list.
    LiteralList(String),
    /// One split per caller supplied parameter list.
    PreEnumerated(Vec<Vec<Value>>),
    /// Count the base query and page it into even row ranges.
    CountRange,
}

impl SplitStrategy {
    pub fn resolve(config: &PlanningConfig) -> Self {
        match (&config.params, &config.parameters) {
            (Some(params), _) if is_query(params) => SplitStrategy::QueryDerived(params.clone()),
            (Some(params), _) => SplitStrategy::LiteralList(params.clone()),
            (None, Some(parameters)) => SplitStrategy::PreEnumerated(parameters.clone()),
            (None, None) => SplitStrategy::CountRange,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SplitStrategy::QueryDerived(_) => "query-derived",
            SplitStrategy::LiteralList(_) => "literal-list",
            SplitStrategy::PreEnumerated(_) => "pre-enumerated",
            SplitStrategy::CountRange => "count-range",
        }
    }
}

/// Whether `text` is a SQL query rather than a literal parameter list.
pub fn is_query(text: &str) -> bool {
    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, text).tokenize() {
        Ok(tokens) => tokens,
        // Unbalanced quotes and the like can only be a literal list
        Err(_) => return false,
    };
    tokens
        .iter()
        .find(|t| !matches!(t, Token::Whitespace(_) | Token::LParen))
        .map(|t| {
            matches!(t, Token::Word(w) if matches!(w.keyword, Keyword::SELECT | Keyword::WITH | Keyword::VALUES))
        })
        .unwrap_or(false)
}

/// Parses `'a', 'b', c` into `["a", "b", "c"]`.
///
/// Tokens are trimmed and lose one matching pair of surrounding quotes.
/// Empty tokens are rejected.
pub fn parse_literal_params(text: &str) -> Result<Vec<String>> {
    text.split(',')
        .enumerate()
        .map(|(i, token)| {
            let token = token.trim();
            if token.is_empty() {
                return Err(Error::configuration(format!(
                    "malformed parameter list {:?}: entry {} is empty",
                    text, i
                )));
            }
            Ok(strip_quotes(token).to_string())
        })
        .collect()
}

fn strip_quotes(token: &str) -> &str {
    for quote in ['\'', '"'] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return &token[1..token.len() - 1];
        }
    }
    token
}

/// Even `[start, end)` ranges over `count` rows.
///
/// The first `split_hint - 1` ranges have width `count / split_hint`; the
/// last one absorbs the remainder. No ranges are produced for an empty
/// result.
pub fn row_ranges(count: u64, split_hint: usize) -> Vec<(u64, u64)> {
    if count == 0 || split_hint == 0 {
        return Vec::new();
    }
    let splits = split_hint as u64;
    let size = count / splits;
    let mut ranges: Vec<(u64, u64)> = (0..splits - 1).map(|i| (i * size, (i + 1) * size)).collect();
    ranges.push(((splits - 1) * size, count));
    ranges
}

/// Produces the ordered splits of one job.
pub struct PartitionPlanner {
    client: Arc<dyn DatabaseClient>,
}

impl PartitionPlanner {
    pub fn new(client: Arc<dyn DatabaseClient>) -> Self {
        Self { client }
    }

    /// Plans `config` into splits.
    ///
    /// `split_hint` is only honored by the count-range strategy. Discovery
    /// queries run on one connection that is closed before returning,
    /// whether planning succeeds or not.
    pub async fn plan(&self, config: &PlanningConfig, split_hint: usize) -> Result<Vec<PartitionSpec>> {
        let base = config.base_query()?;
        let strategy = SplitStrategy::resolve(config);
        debug!(strategy = strategy.name(), split_hint, "creating splits");

        let splits: Vec<PartitionSpec> = match strategy {
            SplitStrategy::QueryDerived(discovery) => {
                debug!(query = %discovery, "creating splits using params query");
                let mut conn = self.client.connect().await?;
                let discovered = discover_params(conn.as_mut(), &discovery).await;
                release(conn).await;
                let rows = discovered?;
                rows.into_iter().map(|params| PartitionSpec::parameterized(base.clone(), params)).collect()
            }
            SplitStrategy::LiteralList(list) => {
                debug!(params = %list, "creating splits using literal params");
                parse_literal_params(&list)?
                    .into_iter()
                    .map(|param| PartitionSpec::parameterized(base.clone(), vec![Value::Text(param)]))
                    .collect()
            }
            SplitStrategy::PreEnumerated(parameters) => {
                debug!(count = parameters.len(), "creating splits using supplied params");
                parameters
                    .into_iter()
                    .map(|params| PartitionSpec::parameterized(base.clone(), params))
                    .collect()
            }
            SplitStrategy::CountRange => {
                if split_hint == 0 {
                    return Err(Error::configuration("split count must be positive"));
                }
                let count_sql = count_query(&base);
                let mut conn = self.client.connect().await?;
                let counted = count_rows(conn.as_mut(), &count_sql).await;
                release(conn).await;
                let count = counted?;
                debug!(split_hint, count, "creating splits using limit and offset");
                row_ranges(count, split_hint)
                    .into_iter()
                    .enumerate()
                    .map(|(i, (start, end))| {
                        debug!(split = i, start, end, "range split");
                        PartitionSpec::ranged(base.clone(), start, end).with_order_by(config.order_by.clone())
                    })
                    .collect()
            }
        };

        info!(splits = splits.len(), "planned partitions");
        Ok(splits)
    }
}

async fn release(mut conn: Box<dyn Connection>) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "failed to close planning connection");
    }
}

async fn discover_params(conn: &mut dyn Connection, discovery: &str) -> Result<Vec<Vec<Value>>> {
    let mut cursor = conn.execute(discovery, &[]).await?;
    let mut rows = Vec::new();
    let fetched = loop {
        match cursor.next_row().await {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => break Ok(rows),
            Err(e) => break Err(e),
        }
    };
    if let Err(e) = cursor.close().await {
        warn!(error = %e, "failed to close discovery cursor");
    }
    fetched
}

async fn count_rows(conn: &mut dyn Connection, counted: &str) -> Result<u64> {
    let mut cursor = conn.execute(counted, &[]).await?;
    let first = cursor.next_row().await;
    if let Err(e) = cursor.close().await {
        warn!(error = %e, "failed to close count cursor");
    }
    let row = first?.ok_or_else(|| Error::execution(counted, "count query returned no rows"))?;
    let count = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::execution(counted, format!("count query returned {:?}", row)))?;
    u64::try_from(count).map_err(|_| Error::execution(counted, format!("negative row count {}", count)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_query() {
        assert!(is_query("select a, b from bounds"));
        assert!(is_query("  SELECT region FROM regions"));
        assert!(is_query("with r as (select 1) select * from r"));
        assert!(is_query("(select 1)"));
        assert!(is_query("values (1), (2)"));
        assert!(!is_query("'a', 'b', c"));
        assert!(!is_query("selection, b"));
        assert!(!is_query("'unterminated"));
        assert!(!is_query(""));
    }

    #[test]
    fn test_parse_literal_params() {
        assert_eq!(parse_literal_params("'a', 'b', c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(parse_literal_params("\"x\",y").unwrap(), vec!["x", "y"]);
        // Only one matching pair is stripped
        assert_eq!(parse_literal_params("''q''").unwrap(), vec!["'q'"]);
        assert_eq!(parse_literal_params("'a\"").unwrap(), vec!["'a\""]);
        assert_eq!(parse_literal_params("''").unwrap(), vec![""]);
        assert_eq!(parse_literal_params("'").unwrap(), vec!["'"]);
    }

    #[test]
    fn test_parse_literal_params_rejects_empty_entries() {
        for text in ["a,,b", "a,", "", "   "] {
            let err = parse_literal_params(text).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{:?} should be rejected", text);
        }
    }

    #[test]
    fn test_base_query_resolution() {
        let config = PlanningConfig::new("  select * from t;  ");
        assert_eq!(config.base_query().unwrap(), "select * from t");

        let config = PlanningConfig { input_query: Some("   ".to_string()), ..Default::default() }
            .with_fallback_query("select 1");
        assert_eq!(config.base_query().unwrap(), "select 1");

        let err = PlanningConfig::default().base_query().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_strategy_priority() {
        let base = PlanningConfig::new("select * from t");
        assert_eq!(SplitStrategy::resolve(&base), SplitStrategy::CountRange);

        let enumerated = base.clone().with_parameters(vec![vec![Value::Integer(1)]]);
        assert_eq!(
            SplitStrategy::resolve(&enumerated),
            SplitStrategy::PreEnumerated(vec![vec![Value::Integer(1)]])
        );

        let literal = enumerated.clone().with_params("a, b");
        assert_eq!(SplitStrategy::resolve(&literal), SplitStrategy::LiteralList("a, b".to_string()));

        let query = enumerated.with_params("select id from regions");
        assert_eq!(
            SplitStrategy::resolve(&query),
            SplitStrategy::QueryDerived("select id from regions".to_string())
        );
    }

    #[test]
    fn test_row_ranges_even_split() {
        assert_eq!(row_ranges(10, 4), vec![(0, 2), (2, 4), (4, 6), (6, 10)]);
        assert_eq!(row_ranges(8, 4), vec![(0, 2), (2, 4), (4, 6), (6, 8)]);
        assert_eq!(row_ranges(5, 1), vec![(0, 5)]);
    }

    #[test]
    fn test_row_ranges_empty_and_small() {
        assert!(row_ranges(0, 4).is_empty());
        assert!(row_ranges(10, 0).is_empty());
        // More splits than rows: leading splits are empty, the last one takes everything
        assert_eq!(row_ranges(2, 3), vec![(0, 0), (0, 0), (0, 2)]);
    }

    #[test]
    fn test_row_ranges_cover_every_row_once() {
        for count in 0..40u64 {
            for hint in 1..12usize {
                let ranges = row_ranges(count, hint);
                if count == 0 {
                    assert!(ranges.is_empty());
                    continue;
                }
                assert_eq!(ranges.len(), hint);
                assert_eq!(ranges[0].0, 0);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].1, pair[1].0, "ranges must be contiguous");
                }
                let width: u64 = ranges.iter().map(|(s, e)| e - s).sum();
                assert_eq!(width, count);
                assert_eq!(ranges.last().unwrap().1, count);
            }
        }
    }
}
