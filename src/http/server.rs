use anyhow::anyhow;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use log::info;
use rouille::{Request, Response, ResponseBody};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    num::NonZeroU32,
    path::Path,
};

use crate::{
    config::HttpConfig,
    http::{error::ApiError, range},
    storage::fs::AudioDir,
};

const CLIP_ROUTE: &str = "/api/audio";
const CACHE_CONTROL: &str = "public, max-age=31536000";

/// Serves the downloaded clips to the game, one file per `/api/audio?id=<id>` request
pub struct ClipServer {
    clips: AudioDir,
    pub config: HttpConfig,
    limiter: Option<DefaultKeyedRateLimiter<String>>,
}

impl ClipServer {
    pub fn new(clips: AudioDir, config: HttpConfig) -> Self {
        let limiter = NonZeroU32::new(config.rate_limit_per_minute)
            .map(|per_minute| RateLimiter::keyed(Quota::per_minute(per_minute)));
        Self {
            clips,
            config,
            limiter,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Blocks serving requests until the process is stopped
    pub fn run(self) -> anyhow::Result<()> {
        let addr = self.address();
        let server = rouille::Server::new(&addr, move |request| self.handle_request(request))
            .map_err(|e| anyhow!("failed to listen on {addr}: {e}"))?;
        info!("Serving clips on http://{}{}", server.server_addr(), CLIP_ROUTE);
        server.run();
        Ok(())
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = if self.over_limit(request) {
            ApiError::TooManyRequests.into_response()
        } else {
            rouille::router!(request,
                (GET) (/api/audio) => {
                    self.handle_get_clip(request)
                },
                (OPTIONS) (/api/audio) => {
                    Response::text("")
                },
                _ => {
                    if request.url() == CLIP_ROUTE {
                        ApiError::MethodNotAllowed.into_response()
                    } else {
                        Response::empty_404()
                    }
                }
            )
        };
        let response = self.with_cors(request, response);

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.raw_url());
    }

    fn over_limit(&self, request: &Request) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check_key(&Self::client_ip(request)).is_err(),
            None => false,
        }
    }

    /// First forwarded address, then the proxy's real-ip header, then the socket peer
    fn client_ip(request: &Request) -> String {
        let forwarded = request
            .header("X-Forwarded-For")
            .and_then(|list| list.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        let real_ip = request
            .header("X-Real-IP")
            .map(str::trim)
            .filter(|ip| !ip.is_empty());

        forwarded
            .or(real_ip)
            .map(str::to_string)
            .unwrap_or_else(|| request.remote_addr().ip().to_string())
    }

    fn with_cors(&self, request: &Request, response: Response) -> Response {
        let response = response
            .with_unique_header("Access-Control-Allow-Methods", "GET, OPTIONS")
            .with_unique_header("Access-Control-Allow-Headers", "Content-Type");

        match request.header("Origin") {
            Some(origin) if self.config.allowed_origins.iter().any(|o| o == origin) => {
                response.with_unique_header("Access-Control-Allow-Origin", origin.to_string())
            }
            _ => response,
        }
    }

    fn handle_get_clip(&self, request: &Request) -> Response {
        match self.get_clip(request) {
            Ok(r) => r,
            Err(e) => e.into_response(),
        }
    }

    /// returns the whole clip, or the requested byte range of it
    fn get_clip(&self, request: &Request) -> Result<Response, ApiError> {
        let id = request
            .get_param("id")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Missing id parameter".into()))?;
        if !is_valid_id(&id) {
            return Err(ApiError::BadRequest("Invalid id format".into()));
        }

        let path = self.clips.clip_path(&id);
        let meta = std::fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(ApiError::NotFound("Audio file not found".into()));
        }
        self.ensure_inside_root(&path)?;

        let size = meta.len();
        let mime = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();
        let mut file = File::open(&path)?;

        let response = match request.header("Range") {
            Some(header) => {
                let span = range::parse(header, size)?;
                file.seek(SeekFrom::Start(span.start))?;
                log::debug!("CLIP {} -> 206, {}", id, span.content_range(size));

                Response {
                    status_code: 206,
                    headers: vec![("Content-Type".into(), mime.into())],
                    data: ResponseBody::from_reader_and_size(file.take(span.len()), span.len() as usize),
                    upgrade: None,
                }
                .with_unique_header("Content-Range", span.content_range(size))
            }
            None => {
                log::debug!("CLIP {} -> 200, path: {}", id, path.to_string_lossy());
                Response::from_file(mime, file)
            }
        };

        Ok(response
            .with_unique_header("Accept-Ranges", "bytes")
            .with_unique_header("Cache-Control", CACHE_CONTROL))
    }

    /// Rejects clips that resolve outside the audio directory, e.g. through a symlink
    fn ensure_inside_root(&self, path: &Path) -> Result<(), ApiError> {
        let root = self.clips.root().canonicalize()?;
        let resolved = path.canonicalize()?;
        if resolved.starts_with(&root) {
            Ok(())
        } else {
            log::warn!("refusing to serve {}, outside {}", resolved.display(), root.display());
            Err(ApiError::Forbidden("Access denied".into()))
        }
    }
}

/// Clip ids are ASCII letters, digits and dashes
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    use rouille::Request;
    use std::{fs, io::Read};
    use tempfile::{TempDir, tempdir};

    fn read_body(response: Response) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut reader = response.data.into_reader_and_size().0;
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn parse_json_response(response: Response) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::from_reader(
            response.data.into_reader_and_size().0,
        )?)
    }

    fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }

    fn config(rate_limit_per_minute: u32) -> HttpConfig {
        HttpConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 3000,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            rate_limit_per_minute,
        }
    }

    /// Server over a temp dir holding `song-1.mp3` with ten known bytes
    fn create_server_with_clip(rate_limit_per_minute: u32) -> anyhow::Result<(TempDir, ClipServer)> {
        let dir = tempdir()?;
        fs::write(dir.path().join("song-1.mp3"), b"0123456789")?;
        let server = ClipServer::new(AudioDir::new(dir.path()), config(rate_limit_per_minute));
        Ok((dir, server))
    }

    fn get(url: &str) -> Request {
        Request::fake_http("GET", url, vec![], vec![])
    }

    #[test]
    fn test_get_clip_success() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;

        let response = server.handle_request(&get("/api/audio?id=song-1"));

        assert_eq!(response.status_code, 200);
        assert_eq!(header(&response, "Content-Type"), Some("audio/mpeg"));
        assert_eq!(header(&response, "Accept-Ranges"), Some("bytes"));
        assert_eq!(header(&response, "Cache-Control"), Some(CACHE_CONTROL));
        assert_eq!(read_body(response)?, b"0123456789");
        Ok(())
    }

    #[test]
    fn test_get_clip_range() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;
        let request = Request::fake_http(
            "GET",
            "/api/audio?id=song-1",
            vec![("Range".to_string(), "bytes=2-5".to_string())],
            vec![],
        );

        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 206);
        assert_eq!(header(&response, "Content-Range"), Some("bytes 2-5/10"));
        assert_eq!(header(&response, "Accept-Ranges"), Some("bytes"));
        assert_eq!(read_body(response)?, b"2345");
        Ok(())
    }

    #[test]
    fn test_get_clip_open_range() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;
        let request = Request::fake_http(
            "GET",
            "/api/audio?id=song-1",
            vec![("Range".to_string(), "bytes=7-".to_string())],
            vec![],
        );

        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 206);
        assert_eq!(header(&response, "Content-Range"), Some("bytes 7-9/10"));
        assert_eq!(read_body(response)?, b"789");
        Ok(())
    }

    #[test]
    fn test_get_clip_unsatisfiable_range() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;
        let request = Request::fake_http(
            "GET",
            "/api/audio?id=song-1",
            vec![("Range".to_string(), "bytes=20-30".to_string())],
            vec![],
        );

        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 416);
        assert_eq!(header(&response, "Content-Range"), Some("bytes */10"));
        Ok(())
    }

    #[test]
    fn test_missing_id() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;

        for url in ["/api/audio", "/api/audio?id="] {
            let response = server.handle_request(&get(url));
            assert_eq!(response.status_code, 400);
            assert_eq!(parse_json_response(response)?["error"], "Missing id parameter");
        }
        Ok(())
    }

    #[test]
    fn test_invalid_id_format() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;

        for url in [
            "/api/audio?id=..%2Fmusic",
            "/api/audio?id=song_1",
            "/api/audio?id=song%201",
            "/api/audio?id=caf%C3%A9",
        ] {
            let response = server.handle_request(&get(url));
            assert_eq!(response.status_code, 400, "{url}");
            assert_eq!(parse_json_response(response)?["error"], "Invalid id format");
        }
        Ok(())
    }

    #[test]
    fn test_clip_not_found() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;

        let response = server.handle_request(&get("/api/audio?id=song-2"));

        assert_eq!(response.status_code, 404);
        assert_eq!(parse_json_response(response)?["error"], "Audio file not found");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_root_is_denied() -> anyhow::Result<()> {
        let outside = tempdir()?;
        fs::write(outside.path().join("secret.mp3"), b"secret")?;
        let (dir, server) = create_server_with_clip(0)?;
        std::os::unix::fs::symlink(
            outside.path().join("secret.mp3"),
            dir.path().join("escape.mp3"),
        )?;

        let response = server.handle_request(&get("/api/audio?id=escape"));

        assert_eq!(response.status_code, 403);
        assert_eq!(parse_json_response(response)?["error"], "Access denied");
        Ok(())
    }

    #[test]
    fn test_other_methods_are_not_allowed() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;

        let request = Request::fake_http("POST", "/api/audio?id=song-1", vec![], vec![]);
        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 405);
        assert_eq!(parse_json_response(response)?["error"], "Method not allowed");
        Ok(())
    }

    #[test]
    fn test_options_preflight() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;
        let request = Request::fake_http(
            "OPTIONS",
            "/api/audio",
            vec![("Origin".to_string(), "http://localhost:5173".to_string())],
            vec![],
        );

        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 200);
        assert_eq!(
            header(&response, "Access-Control-Allow-Origin"),
            Some("http://localhost:5173")
        );
        assert_eq!(
            header(&response, "Access-Control-Allow-Methods"),
            Some("GET, OPTIONS")
        );
        assert!(read_body(response)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_origin_gets_no_allow_header() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;
        let request = Request::fake_http(
            "GET",
            "/api/audio?id=song-1",
            vec![("Origin".to_string(), "https://elsewhere.example".to_string())],
            vec![],
        );

        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 200);
        assert_eq!(header(&response, "Access-Control-Allow-Origin"), None);
        Ok(())
    }

    #[test]
    fn test_unknown_route() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(0)?;
        let response = server.handle_request(&get("/api/other"));
        assert_eq!(response.status_code, 404);
        Ok(())
    }

    #[test]
    fn test_rate_limit_per_client() -> anyhow::Result<()> {
        let (_dir, server) = create_server_with_clip(2)?;
        let from = |ip: &str| {
            Request::fake_http(
                "GET",
                "/api/audio?id=song-1",
                vec![("X-Forwarded-For".to_string(), format!("{ip}, 10.0.0.1"))],
                vec![],
            )
        };

        assert_eq!(server.handle_request(&from("203.0.113.7")).status_code, 200);
        assert_eq!(server.handle_request(&from("203.0.113.7")).status_code, 200);

        let limited = server.handle_request(&from("203.0.113.7"));
        assert_eq!(limited.status_code, 429);
        assert_eq!(parse_json_response(limited)?["error"], "Too many requests");

        // another client has its own budget
        assert_eq!(server.handle_request(&from("198.51.100.2")).status_code, 200);
        Ok(())
    }

    #[test]
    fn test_client_ip_fallbacks() {
        let real_ip = Request::fake_http(
            "GET",
            "/api/audio",
            vec![("X-Real-IP".to_string(), "192.0.2.9".to_string())],
            vec![],
        );
        assert_eq!(ClipServer::client_ip(&real_ip), "192.0.2.9");

        let forwarded = Request::fake_http(
            "GET",
            "/api/audio",
            vec![
                ("X-Forwarded-For".to_string(), " 192.0.2.1 , 192.0.2.2".to_string()),
                ("X-Real-IP".to_string(), "192.0.2.9".to_string()),
            ],
            vec![],
        );
        assert_eq!(ClipServer::client_ip(&forwarded), "192.0.2.1");

        let direct = get("/api/audio");
        assert_eq!(
            ClipServer::client_ip(&direct),
            direct.remote_addr().ip().to_string()
        );
    }

    #[test]
    fn test_id_format() {
        assert!(is_valid_id("song-1"));
        assert!(is_valid_id("ABC-def-42"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("../song"));
        assert!(!is_valid_id("song.mp3"));
    }
}
