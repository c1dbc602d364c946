//! Assembly of the top-level router: per-module mounting, the shared
//! middleware stack, and the merged OpenAPI document.

use std::time::Duration;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};

use biblio_kernel::settings::ServerSettings;
use biblio_kernel::ModuleRegistry;

/// Incrementally assembles the application router.
pub struct RouterBuilder {
    router: Router,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
        }
    }

    pub fn route(mut self, path: &str, route: axum::routing::MethodRouter) -> Self {
        self.router = self.router.route(path, route);
        self
    }

    /// Nest a module's routes under `/api/{name}`.
    pub fn mount_module(mut self, name: &str, routes: Router) -> Self {
        self.router = self.router.nest(&format!("/api/{name}"), routes);
        self
    }

    /// The shared middleware stack: request tracing, permissive CORS, an
    /// `x-request-id` on every request, and the global timeout.
    pub fn with_middleware(mut self, server: &ServerSettings) -> Self {
        self.router = self
            .router
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_request(DefaultOnRequest::new().level(tracing::Level::INFO))
                    .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
            )
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TimeoutLayer::new(Duration::from_millis(
                server.request_timeout_ms,
            )));
        self
    }

    /// Merge every module's OpenAPI fragment into one document, serve it at
    /// `/docs/openapi.json`, and mount Swagger UI on top of it.
    pub fn with_openapi(mut self, registry: &ModuleRegistry) -> Self {
        let spec = merged_spec(registry);

        let openapi: utoipa::openapi::OpenApi =
            serde_json::from_value(spec.clone()).unwrap_or_else(|_| {
                utoipa::openapi::OpenApiBuilder::new()
                    .info(
                        utoipa::openapi::InfoBuilder::new()
                            .title("biblio API")
                            .version(env!("CARGO_PKG_VERSION"))
                            .build(),
                    )
                    .build()
            });

        self.router = self.router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi),
        );
        self.router = self.router.route(
            "/docs/openapi.json",
            get(move || async move { Json(spec.clone()) }),
        );
        self
    }

    pub fn build(self) -> Router {
        self.router
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn merged_spec(registry: &ModuleRegistry) -> Value {
    let mut spec = json!({
        "openapi": "3.0.0",
        "info": {
            "title": "biblio API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Library-management backend: catalog, reservations, lending"
        },
        "paths": {
            "/healthz": {
                "get": {
                    "summary": "Health check",
                    "responses": { "200": { "description": "OK" } }
                }
            }
        },
        "components": {
            "schemas": {
                "ErrorResponse": {
                    "type": "object",
                    "properties": {
                        "error": {
                            "type": "object",
                            "properties": {
                                "code": { "type": "string" },
                                "message": { "type": "string" },
                                "details": { "type": "array", "items": {} },
                                "trace_id": { "type": "string" },
                                "timestamp": { "type": "string" }
                            },
                            "required": ["code", "message", "trace_id", "timestamp"]
                        }
                    },
                    "required": ["error"]
                }
            }
        }
    });

    for module in registry.modules() {
        let Some(fragment) = module.openapi() else {
            continue;
        };
        // Module paths are declared relative to the module root; prefix them
        // with the mount point.
        if let Some(paths) = fragment.get("paths").and_then(Value::as_object) {
            for (path, item) in paths {
                spec["paths"][format!("/api/{}{path}", module.name())] = item.clone();
            }
        }
        if let Some(schemas) = fragment
            .pointer("/components/schemas")
            .and_then(Value::as_object)
        {
            for (name, schema) in schemas {
                spec["components"]["schemas"][name] = schema.clone();
            }
        }
    }

    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct SpecModule;

    impl biblio_kernel::Module for SpecModule {
        fn name(&self) -> &'static str {
            "lending"
        }

        fn openapi(&self) -> Option<Value> {
            Some(json!({
                "paths": {
                    "/reservations": { "post": { "summary": "reserve" } }
                },
                "components": {
                    "schemas": { "Reservation": { "type": "object" } }
                }
            }))
        }
    }

    #[test]
    fn module_paths_are_prefixed_with_their_mount_point() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(SpecModule));

        let spec = merged_spec(&registry);
        assert!(spec["paths"]["/api/lending/reservations"]["post"].is_object());
        assert!(spec["components"]["schemas"]["Reservation"].is_object());
        // The health endpoint survives the merge.
        assert!(spec["paths"]["/healthz"]["get"].is_object());
    }

    #[tokio::test]
    async fn builder_composes_routes_middleware_and_docs() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(SpecModule));

        let _router = RouterBuilder::new()
            .route("/healthz", get(|| async { "ok" }))
            .mount_module("lending", Router::new().route("/x", get(|| async { "x" })))
            .with_middleware(&ServerSettings::default())
            .with_openapi(&registry)
            .build();
    }
}
