//! Metrics instrumentation for the public API surface: `&'static str`
//! name constants plus a describe/zero initialisation pattern.

/// Container for chain store metrics.
#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    pub(crate) const REQUESTS_SUCCESS_TOTAL: &'static str = "chainstore_requests_success_total";
    pub(crate) const REQUESTS_ERROR_TOTAL: &'static str = "chainstore_requests_error_total";
    pub(crate) const REQUEST_DURATION_SECONDS: &'static str = "chainstore_request_duration_seconds";

    pub(crate) const METHOD_PUT_BLOCK: &'static str = "put_block";
    pub(crate) const METHOD_PUT_HEADER: &'static str = "put_header";
    pub(crate) const METHOD_GET_BLOCK: &'static str = "get_block";
    pub(crate) const METHOD_GET_BLOCKS: &'static str = "get_blocks";
    pub(crate) const METHOD_GET_HEAD: &'static str = "get_head";
    pub(crate) const METHOD_GET_LATEST_HEADER: &'static str = "get_latest_header";
    pub(crate) const METHOD_GET_LATEST_BLOCK: &'static str = "get_latest_block";
    pub(crate) const METHOD_DEL_BLOCK: &'static str = "del_block";
    pub(crate) const METHOD_ITERATOR: &'static str = "iterator";
    pub(crate) const METHOD_SELECT_NEEDED_HASHES: &'static str = "select_needed_hashes";

    const ALL_METHODS: &'static [&'static str] = &[
        Self::METHOD_PUT_BLOCK,
        Self::METHOD_PUT_HEADER,
        Self::METHOD_GET_BLOCK,
        Self::METHOD_GET_BLOCKS,
        Self::METHOD_GET_HEAD,
        Self::METHOD_GET_LATEST_HEADER,
        Self::METHOD_GET_LATEST_BLOCK,
        Self::METHOD_DEL_BLOCK,
        Self::METHOD_ITERATOR,
        Self::METHOD_SELECT_NEEDED_HASHES,
    ];

    pub(crate) fn init(chain_id: u64) {
        Self::describe();
        Self::zero(chain_id);
    }

    fn describe() {
        metrics::describe_counter!(
            Self::REQUESTS_SUCCESS_TOTAL,
            metrics::Unit::Count,
            "Total number of successful chain store requests"
        );
        metrics::describe_counter!(
            Self::REQUESTS_ERROR_TOTAL,
            metrics::Unit::Count,
            "Total number of failed chain store requests"
        );
        metrics::describe_histogram!(
            Self::REQUEST_DURATION_SECONDS,
            metrics::Unit::Seconds,
            "Duration of chain store requests"
        );
    }

    fn zero(chain_id: u64) {
        for method in Self::ALL_METHODS {
            metrics::counter!(
                Self::REQUESTS_SUCCESS_TOTAL,
                "method" => *method,
                "chain_id" => chain_id.to_string()
            )
            .increment(0);

            metrics::counter!(
                Self::REQUESTS_ERROR_TOTAL,
                "method" => *method,
                "chain_id" => chain_id.to_string()
            )
            .increment(0);

            metrics::histogram!(
                Self::REQUEST_DURATION_SECONDS,
                "method" => *method,
                "chain_id" => chain_id.to_string()
            )
            .record(0.0);
        }
    }
}
