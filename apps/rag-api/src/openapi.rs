//! OpenAPI documentation configuration

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RAG API",
        description = "Embeds per-user MongoDB records into Atlas vector search and answers questions over them",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    )
)]
struct BaseDoc;

/// Service metadata merged with the RAG domain's paths (mounted at the root)
pub struct ApiDoc;

impl OpenApi for ApiDoc {
    fn openapi() -> utoipa::openapi::OpenApi {
        BaseDoc::openapi().merge_from(domain_rag::ApiDoc::openapi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_root_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/",
            "/process",
            "/query",
            "/create_index",
            "/list_indexes/{database_name}/{collection_name}",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc.info.title, "RAG API");
    }
}
