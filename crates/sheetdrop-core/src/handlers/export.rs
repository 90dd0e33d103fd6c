//! JSON to CSV download handler
//!
//! Decodes the request body into a [`Table`], encodes it with [`CsvEncoder`]
//! and wraps the result in a response carrying attachment headers. The CSV is
//! assembled in memory; nothing touches the filesystem.

use crate::config::ExportConfig;
use crate::encoder::CsvEncoder;
use crate::table::Table;
use crate::{Request, Response, ResponseBuilder, Result, StatusCode};

/// Content type sent with every export
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Export handler. Immutable, so one instance serves all requests.
#[derive(Debug, Clone, Default)]
pub struct CsvExport {
    config: ExportConfig,
}

impl CsvExport {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Convert a raw body using the configured options
    pub fn handle(&self, body: &[u8]) -> Result<Response> {
        export(body, &self.config)
    }

    /// Handle a full request: apply query overrides, convert, and map any
    /// failure to an error response without a CSV body.
    pub fn respond(&self, req: &Request) -> Response {
        let result = self
            .config
            .with_overrides(&req.query_params())
            .and_then(|config| export(&req.body, &config));

        match result {
            Ok(res) => res,
            Err(err) => {
                if err.is_client_error() {
                    tracing::warn!(error = %err, "export rejected");
                } else {
                    tracing::error!(error = %err, "export failed");
                }
                Response::from_error(&err)
            }
        }
    }
}

fn export(body: &[u8], config: &ExportConfig) -> Result<Response> {
    let table = Table::from_json(body)?;
    let csv = CsvEncoder::from_config(config).encode(&table)?;

    tracing::info!(
        rows = table.len(),
        nested = table.nested_fields(),
        bytes = csv.len(),
        filename = %config.filename,
        "csv export"
    );

    Ok(ResponseBuilder::new(StatusCode::OK)
        .header("content-type", CSV_CONTENT_TYPE)
        .header("content-disposition", config.content_disposition())
        .header("cache-control", "no-store")
        .body(csv)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Method, RequestBuilder};

    #[test]
    fn test_star_wars_export() {
        let res = CsvExport::default()
            .handle(br#"[["Luke","Jedi"],["Vader","Sith"]]"#)
            .unwrap();

        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/csv; charset=utf-8"));
        assert_eq!(
            res.header("content-disposition"),
            Some("attachment; filename=\"data.csv\"")
        );
        assert_eq!(res.body_string().unwrap(), "Luke;Jedi\nVader;Sith\n");
    }

    #[test]
    fn test_empty_array_still_downloads() {
        let res = CsvExport::default().handle(b"[]").unwrap();
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body.is_empty());
        assert_eq!(
            res.header("content-disposition"),
            Some("attachment; filename=\"data.csv\"")
        );
    }

    #[test]
    fn test_malformed_input() {
        let export = CsvExport::default();
        assert!(matches!(
            export.handle(br#"{"a":1}"#),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            export.handle(br#""hello""#),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_configured_filename_and_delimiter() {
        let export = CsvExport::new(ExportConfig::new().filename("crew.csv").delimiter(b','));
        let res = export.handle(br#"[["a;b","c"]]"#).unwrap();
        assert_eq!(res.body_string().unwrap(), "a;b,c\n");
        assert_eq!(
            res.header("content-disposition"),
            Some("attachment; filename=\"crew.csv\"")
        );
    }

    #[test]
    fn test_identical_input_identical_output() {
        let export = CsvExport::default();
        let body = br#"[[{"x":[1,{"y":null}]},2.0,"a\"b"]]"#;
        let a = export.handle(body).unwrap();
        let b = export.handle(body).unwrap();
        assert_eq!(a.body, b.body);
    }

    #[test]
    fn test_respond_with_overrides() {
        let req = RequestBuilder::new(Method::Post, "/export")
            .query("filename=rebels&delimiter=%7C")
            .body(r#"[["a|b","c"]]"#)
            .build();
        let res = CsvExport::default().respond(&req);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().unwrap(), "\"a|b\"|c\n");
        assert_eq!(
            res.header("content-disposition"),
            Some("attachment; filename=\"rebels.csv\"")
        );
    }

    #[test]
    fn test_respond_with_non_ascii_filename() {
        let req = RequestBuilder::new(Method::Post, "/export")
            .query("filename=%C3%A9quipe")
            .body(r#"[["a"]]"#)
            .build();
        let res = CsvExport::default().respond(&req);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(
            res.header("content-disposition"),
            Some("attachment; filename=\"_quipe.csv\"; filename*=UTF-8''%C3%A9quipe.csv")
        );
    }

    #[test]
    fn test_respond_maps_errors_without_csv() {
        let req = RequestBuilder::new(Method::Post, "/export")
            .body("not json")
            .build();
        let res = CsvExport::default().respond(&req);
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.header("content-type"), Some("text/plain"));
        assert!(res.header("content-disposition").is_none());
    }

    #[test]
    fn test_respond_rejects_bad_override() {
        let req = RequestBuilder::new(Method::Post, "/export")
            .query("delimiter=%22")
            .body("[]")
            .build();
        let res = CsvExport::default().respond(&req);
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert!(res.body_string().unwrap().starts_with("Invalid option"));
    }
}
