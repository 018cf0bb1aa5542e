// Declarative route table (first match wins)

use crate::domain::Method;

/// Handler selected by the route table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Status,
    SuspendStatus,
    ListJobs,
    GetPipeline,
    RunPipeline,
    StopPipeline,
    ListBranches,
    GetBuild,
    BulkBuildStatus,
    InitExecutor,
    TestConnection,
    UpsertCredentials,
    DeleteExecutor,
}

#[derive(Debug, Clone, Copy)]
enum Seg {
    Lit(&'static str),
    Param,
}

struct Route {
    method: Method,
    pattern: &'static [Seg],
    kind: RouteKind,
}

use Seg::{Lit, Param};

/// Order is significant and must not be re-sorted
#[rustfmt::skip]
const ROUTES: &[Route] = &[
    Route { method: Method::Get, pattern: &[Lit("status")], kind: RouteKind::Status },
    Route { method: Method::Put, pattern: &[Lit("suspend_status")], kind: RouteKind::SuspendStatus },
    Route { method: Method::Get, pattern: &[Lit("jobs")], kind: RouteKind::ListJobs },
    Route { method: Method::Get, pattern: &[Lit("jobs"), Param], kind: RouteKind::GetPipeline },
    Route { method: Method::Post, pattern: &[Lit("jobs"), Param, Lit("run")], kind: RouteKind::RunPipeline },
    Route { method: Method::Post, pattern: &[Lit("jobs"), Param, Lit("stop")], kind: RouteKind::StopPipeline },
    Route { method: Method::Get, pattern: &[Lit("jobs"), Param, Lit("branches")], kind: RouteKind::ListBranches },
    Route { method: Method::Get, pattern: &[Lit("jobs"), Param, Lit("builds"), Param], kind: RouteKind::GetBuild },
    Route { method: Method::Post, pattern: &[Lit("builds"), Lit("status")], kind: RouteKind::BulkBuildStatus },
    Route { method: Method::Post, pattern: &[Lit("executor"), Lit("init")], kind: RouteKind::InitExecutor },
    Route { method: Method::Post, pattern: &[Lit("executor"), Lit("test"), Lit("connection")], kind: RouteKind::TestConnection },
    Route { method: Method::Post, pattern: &[Lit("executor"), Lit("credentials")], kind: RouteKind::UpsertCredentials },
    Route { method: Method::Delete, pattern: &[Lit("executor"), Param], kind: RouteKind::DeleteExecutor },
];

/// Matched route with its positional parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub kind: RouteKind,
    pub params: Vec<&'a str>,
}

impl<'a> RouteMatch<'a> {
    pub fn param(&self, index: usize) -> &'a str {
        self.params.get(index).copied().unwrap_or_default()
    }
}

/// Find the first route matching method and segments
pub fn match_route<'a>(method: Method, segments: &'a [String]) -> Option<RouteMatch<'a>> {
    ROUTES
        .iter()
        .filter(|route| route.method == method && route.pattern.len() == segments.len())
        .find_map(|route| {
            let mut params = Vec::new();
            for (seg, actual) in route.pattern.iter().zip(segments) {
                match seg {
                    Lit(literal) if *literal == actual.as_str() => {}
                    Lit(_) => return None,
                    Param => params.push(actual.as_str()),
                }
            }
            Some(RouteMatch {
                kind: route.kind,
                params,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    #[test]
    fn test_literal_routes() {
        let s = segs("status");
        assert_eq!(match_route(Method::Get, &s).unwrap().kind, RouteKind::Status);

        let s = segs("executor/test/connection");
        assert_eq!(
            match_route(Method::Post, &s).unwrap().kind,
            RouteKind::TestConnection
        );
    }

    #[test]
    fn test_params_captured_in_order() {
        let s = segs("jobs/job-a/builds/17");
        let matched = match_route(Method::Get, &s).unwrap();
        assert_eq!(matched.kind, RouteKind::GetBuild);
        assert_eq!(matched.params, vec!["job-a", "17"]);
    }

    #[test]
    fn test_literal_beats_param_by_order() {
        // "executor/credentials" is listed before "executor/{id}" but only for POST
        let s = segs("executor/credentials");
        assert_eq!(
            match_route(Method::Post, &s).unwrap().kind,
            RouteKind::UpsertCredentials
        );
        let matched = match_route(Method::Delete, &s).unwrap();
        assert_eq!(matched.kind, RouteKind::DeleteExecutor);
        assert_eq!(matched.param(0), "credentials");
    }

    #[test]
    fn test_method_mismatch_falls_through() {
        let s = segs("status");
        assert!(match_route(Method::Post, &s).is_none());
        let s = segs("jobs/job-a/run");
        assert!(match_route(Method::Get, &s).is_none());
    }

    #[test]
    fn test_unknown_path() {
        assert!(match_route(Method::Get, &segs("unknown/path")).is_none());
        assert!(match_route(Method::Get, &[]).is_none());
    }
}
