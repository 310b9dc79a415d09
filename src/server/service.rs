use std::sync::Arc;

use http::Method;
use tracing::warn;

use super::http_server::{BodyReader, HeadError, HttpService, RequestHead};
use super::request::RequestContext;
use super::response::ResponseWriter;
use crate::app::App;
use crate::error::ApiError;

/// Connection-side adapter around a shared [`App`].
///
/// Each accepted connection gets its own clone; clones share the pipeline.
#[derive(Clone)]
pub struct AppService {
    pub app: Arc<App>,
}

impl AppService {
    #[must_use]
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    #[must_use]
    pub fn from_shared(app: Arc<App>) -> Self {
        Self { app }
    }

    fn envelope_only(&self, err: &ApiError, ctx: &RequestContext<'_>) -> ResponseWriter {
        let mut writer = ResponseWriter::new();
        self.app.normalizer().handle(err, ctx.info(), &mut writer);
        writer
    }
}

impl HttpService for AppService {
    fn call(&mut self, head: &RequestHead, body: &mut BodyReader<'_>) -> ResponseWriter {
        let Ok(method) = head.method.parse::<Method>() else {
            warn!(method = %head.method, target = %head.target, "Malformed HTTP method");
            let ctx = RequestContext::new(Method::GET, head.target.as_str());
            return self.envelope_only(&ApiError::bad_request("Malformed HTTP method"), &ctx);
        };
        let mut ctx = RequestContext::new(method, head.target.as_str());
        for (name, value) in &head.headers {
            ctx = ctx.with_header(name, value.as_str());
        }
        // The body stays unread until the JSON body step pulls it.
        let ctx = ctx.with_body_stream(body);

        let mut writer = ResponseWriter::new();
        self.app.handle(ctx, &mut writer);
        writer.finish();
        writer
    }

    fn reject(&mut self, error: &HeadError) -> ResponseWriter {
        let ctx = RequestContext::new(Method::GET, "*");
        let err = match error {
            HeadError::Malformed(detail) => {
                ApiError::new(error.status(), "Malformed request").with_error(detail.to_string())
            }
            _ => ApiError::new(error.status(), error.to_string()),
        };
        self.envelope_only(&err, &ctx)
    }
}
