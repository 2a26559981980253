use super::{sn, Analyzer, Mid, Module, ModuleBase, ModuleType, ParseResponse, ScoreCalculator};
use crate::data::{ParsedData, Response};
use crate::error::SpiderError;
use std::sync::Arc;
use tracing::trace;

/// An analyzer running a fixed list of response parsers in order.
pub struct ParserAnalyzer {
    base: ModuleBase,
    parsers: Vec<ParseResponse>,
}

impl ParserAnalyzer {
    pub fn new(
        mid: Mid,
        parsers: Vec<ParseResponse>,
        calculator: ScoreCalculator,
    ) -> Result<Self, SpiderError> {
        if mid.module_type() != ModuleType::Analyzer {
            return Err(SpiderError::IncorrectModuleType {
                mid,
                module_type: ModuleType::Analyzer,
            });
        }
        if parsers.is_empty() {
            return Err(SpiderError::illegal("empty response parser list"));
        }
        Ok(Self {
            base: ModuleBase::with_calculator(mid, calculator),
            parsers,
        })
    }
}

impl Module for ParserAnalyzer {
    fn base(&self) -> &ModuleBase {
        &self.base
    }

    fn as_analyzer(&self) -> Option<&dyn Analyzer> {
        Some(self)
    }
}

impl Analyzer for ParserAnalyzer {
    fn resp_parsers(&self) -> Vec<ParseResponse> {
        self.parsers.clone()
    }

    fn analyze(&self, response: &Response) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
        let _handling = self.base.begin_handling();
        self.base.incr_called_count();
        self.base.incr_accepted_count();

        let depth = response.depth();
        trace!(
            "[Analyzer] --> Parse the response (URL: {}, depth: {})",
            response.url,
            depth
        );

        let mut data_list = Vec::new();
        let mut error_list = Vec::new();
        for parser in &self.parsers {
            let (data, errors) = parser(response, depth);
            data_list.extend(data);
            error_list.extend(errors);
        }

        if error_list.is_empty() {
            self.base.incr_completed_count();
        }
        (data_list, error_list)
    }
}

/// Creates `number` analyzers sharing `parsers`, with serials from the
/// global generator.
pub fn analyzers(
    number: u32,
    parsers: Vec<ParseResponse>,
) -> Result<Vec<Arc<dyn Module>>, SpiderError> {
    let mut modules: Vec<Arc<dyn Module>> = Vec::with_capacity(number as usize);
    for _ in 0..number {
        let mid = Mid::new(ModuleType::Analyzer, sn::global().get(), None);
        let analyzer = ParserAnalyzer::new(mid, parsers.clone(), super::calculate_score_simple)?;
        modules.push(Arc::new(analyzer));
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Item, Request};
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};

    fn response(body: &'static str) -> Response {
        Response::new(
            Request::parse("http://example.com/").unwrap(),
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(body.as_bytes()),
        )
    }

    fn link_parser(resp: &Response, _depth: u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
        match resp.follow(resp.text().trim()) {
            Ok(next) => (vec![next.into()], vec![]),
            Err(e) => (vec![], vec![e.into()]),
        }
    }

    fn body_parser(resp: &Response, depth: u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
        let item = Item::new().with("body", resp.text()).with("depth", depth);
        (vec![item.into()], vec![])
    }

    fn failing_parser(_resp: &Response, _depth: u32) -> (Vec<ParsedData>, Vec<anyhow::Error>) {
        (vec![], vec![anyhow::anyhow!("bad markup")])
    }

    #[test]
    fn every_parser_sees_the_full_body() {
        let link: ParseResponse = Arc::new(link_parser);
        let title: ParseResponse = Arc::new(body_parser);
        let modules = analyzers(1, vec![link, title]).unwrap();
        let analyzer = modules[0].as_analyzer().unwrap();

        let (data, errors) = analyzer.analyze(&response("/next"));
        assert!(errors.is_empty());
        assert_eq!(data.len(), 2);
        match &data[0] {
            ParsedData::Request(req) => {
                assert_eq!(req.url.as_str(), "http://example.com/next");
                assert_eq!(req.depth(), 1);
            }
            other => panic!("expected request, got {:?}", other),
        }
        match &data[1] {
            ParsedData::Item(item) => assert_eq!(item.get("body").unwrap(), "/next"),
            other => panic!("expected item, got {:?}", other),
        }
        assert_eq!(modules[0].counts().completed, 1);
    }

    #[test]
    fn parser_errors_keep_call_incomplete() {
        let failing: ParseResponse = Arc::new(failing_parser);
        let modules = analyzers(1, vec![failing]).unwrap();
        let (data, errors) = modules[0].as_analyzer().unwrap().analyze(&response(""));
        assert!(data.is_empty());
        assert_eq!(errors.len(), 1);
        let counts = modules[0].counts();
        assert_eq!((counts.called, counts.completed, counts.handling), (1, 0, 0));
    }

    #[test]
    fn empty_parser_list_is_rejected() {
        assert!(matches!(
            analyzers(1, vec![]),
            Err(SpiderError::IllegalParameter(_))
        ));
    }
}
