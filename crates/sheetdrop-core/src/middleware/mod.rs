//! Middleware implementations

pub mod request_id;

pub use request_id::{RequestId, REQUEST_ID_HEADER};

use crate::{Request, Response};

/// Middleware trait - process request/response
pub trait Middleware: Send + Sync {
    /// Process request before handler
    fn before(&self, req: &mut Request) -> Option<Response>;

    /// Process response after handler
    fn after(&self, req: &Request, res: &mut Response);
}

/// Middleware chain
pub struct MiddlewareChain {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Box::new(middleware));
    }

    /// Run before middlewares, return early response if any
    pub fn run_before(&self, req: &mut Request) -> Option<Response> {
        for m in &self.middlewares {
            if let Some(res) = m.before(req) {
                return Some(res);
            }
        }
        None
    }

    /// Run after middlewares in reverse order
    pub fn run_after(&self, req: &Request, res: &mut Response) {
        for m in self.middlewares.iter().rev() {
            m.after(req, res);
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, RequestBuilder, StatusCode};

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn before(&self, _req: &mut Request) -> Option<Response> {
            None
        }

        fn after(&self, _req: &Request, res: &mut Response) {
            res.headers.push(("x-order".to_string(), self.0.to_string()));
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn before(&self, _req: &mut Request) -> Option<Response> {
            Some(Response::plain(StatusCode::FORBIDDEN, "Forbidden"))
        }

        fn after(&self, _req: &Request, _res: &mut Response) {}
    }

    #[test]
    fn test_after_runs_in_reverse() {
        let mut chain = MiddlewareChain::new();
        chain.add(Tag("outer"));
        chain.add(Tag("inner"));

        let req = RequestBuilder::new(Method::Get, "/").build();
        let mut res = Response::new(StatusCode::OK);
        chain.run_after(&req, &mut res);

        let order: Vec<&str> = res.headers.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(order, vec!["inner", "outer"]);
    }

    #[test]
    fn test_before_short_circuits() {
        let mut chain = MiddlewareChain::new();
        chain.add(Deny);
        chain.add(RequestId);

        let mut req = RequestBuilder::new(Method::Post, "/export").body("[[]]").build();
        let res = chain.run_before(&mut req).unwrap();
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        // request-id never ran
        assert!(req.header(REQUEST_ID_HEADER).is_none());
    }
}
