
mod server_decode {
    use super::test_utils::TestIO;
    use http_types::{Method, StatusCode, Version};
    use pretty_assertions::assert_eq;
    use snail_api::server::{self, ConnectionStatus};
    use snail_api::{App, Error, Handler, Request, Router, ServerOptions};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// A router that records the request it saw on `/echo`.
    fn echo_router(seen: &Arc<Mutex<Option<Request>>>) -> Router {
        let seen = seen.clone();
        let mut app = App::new();
        app.route(
            "/echo",
            [Handler::terminal(move |req, res| {
                *seen.lock().unwrap() = Some(req.clone());
                let body = req.body().to_vec();
                Box::pin(async move { res.send_as(body, "application/octet-stream") })
            })],
        );
        app.into_router()
    }

    async fn run(io: &TestIO, opts: &ServerOptions) -> (snail_api::Result<ConnectionStatus>, Option<Request>) {
        let seen = Arc::new(Mutex::new(None));
        let router = echo_router(&seen);
        let status = server::accept_with_opts(io.clone(), &router, opts).await;
        let req = seen.lock().unwrap().take();
        (status, req)
    }

    #[async_std::test]
    async fn post_with_body() {
        let io = TestIO::new(
            "POST /echo HTTP/1.1\r\n\
             Host: localhost:4221\r\n\
             Content-Length: 5\r\n\
             Content-Type: text/plain\r\n\
             Another-Header: header value\r\n\
             another-header: other header value\r\n\
             Cookie: token=abc; theme=dark\r\n\
             \r\n\
             hello",
        );
        let (status, req) = run(&io, &ServerOptions::default()).await;
        assert_eq!(status.unwrap(), ConnectionStatus::Responded(StatusCode::Ok));

        let req = req.unwrap();
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.path(), "/echo");
        assert_eq!(req.version(), Version::Http1_1);
        assert_eq!(req.header("host"), Some("localhost:4221"));
        assert_eq!(req.header("another-header"), Some("other header value"));
        assert_eq!(req.cookie("token"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.body_string().unwrap(), "hello");
        assert!(io.written_string().ends_with("\r\n\r\nhello"));
    }

    #[async_std::test]
    async fn request_split_across_reads() {
        let io = TestIO::chunked(vec![
            b"PUT /ec".to_vec(),
            b"ho HTTP/1.1\r\nContent-Le".to_vec(),
            b"ngth: 11\r\n\r".to_vec(),
            b"\nhello ".to_vec(),
            b"world".to_vec(),
        ]);
        let (status, req) = run(&io, &ServerOptions::default()).await;
        assert_eq!(status.unwrap(), ConnectionStatus::Responded(StatusCode::Ok));

        let req = req.unwrap();
        assert_eq!(req.method(), Method::Put);
        assert_eq!(req.body(), b"hello world");
    }

    #[async_std::test]
    async fn bytes_past_the_body_are_discarded() {
        let io = TestIO::new("POST /echo HTTP/1.1\r\nContent-Length: 2\r\n\r\nokGET / HTTP/1.1\r\n\r\n");
        let (_, req) = run(&io, &ServerOptions::default()).await;
        assert_eq!(req.unwrap().body(), b"ok");
    }

    #[async_std::test]
    async fn query_string_is_dropped_from_the_path() {
        let io = TestIO::new("GET /echo?x=1 HTTP/1.0\r\n\r\n");
        let (status, req) = run(&io, &ServerOptions::default()).await;
        assert_eq!(status.unwrap(), ConnectionStatus::Responded(StatusCode::Ok));
        let req = req.unwrap();
        assert_eq!(req.path(), "/echo");
        assert_eq!(req.version(), Version::Http1_0);
    }

    #[async_std::test]
    async fn malformed_requests_get_400() {
        let cases: &[&[u8]] = &[
            b"DELETE /echo HTTP/1.1\r\n\r\n",
            b"GET echo HTTP/1.1\r\n\r\n",
            b"GET /echo HTTP/1.1\r\nX-Folded: a\r\n b\r\n\r\n",
            b"POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n",
            b"POST /echo HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab",
            b"\xff\xfe /echo HTTP/1.1\r\n\r\n",
        ];
        for case in cases {
            let io = TestIO::new(*case);
            let (status, req) = run(&io, &ServerOptions::default()).await;
            assert_eq!(
                status.unwrap(),
                ConnectionStatus::Responded(StatusCode::BadRequest),
                "{:?}",
                String::from_utf8_lossy(case)
            );
            assert!(req.is_none());

            let written = io.written_string();
            assert!(written.starts_with("HTTP/1.1 400 Bad Request\r\n"));
            assert!(written.contains(r#""error":"Bad Request""#));
        }
    }

    #[async_std::test]
    async fn oversized_head_aborts_without_response() {
        let mut request = b"GET /echo HTTP/1.1\r\n".to_vec();
        request.extend(std::iter::repeat(b'a').take(200));
        let io = TestIO::new(request);
        let opts = ServerOptions::default().with_max_head_length(64);

        let (status, req) = run(&io, &opts).await;
        assert!(matches!(status, Err(Error::HeadTooLarge(64))));
        assert!(req.is_none());
        assert!(io.written().is_empty());
    }

    #[async_std::test]
    async fn oversized_body_aborts_without_response() {
        let io = TestIO::new("POST /echo HTTP/1.1\r\nContent-Length: 5000\r\n\r\n");
        let opts = ServerOptions::default().with_max_request_length(1024);

        let (status, _) = run(&io, &opts).await;
        assert!(matches!(status, Err(Error::RequestTooLarge(1024))));
        assert!(io.written().is_empty());
    }

    #[async_std::test]
    async fn slow_client_times_out() {
        let io = TestIO::stalled(vec![b"GET /echo HTTP/1.1\r\n".to_vec()]);
        let opts = ServerOptions::default().with_read_timeout(Some(Duration::from_millis(50)));

        let (status, req) = run(&io, &opts).await;
        assert!(matches!(status, Err(Error::Timeout(_))));
        assert!(req.is_none());
        assert!(io.written().is_empty());
    }

    #[async_std::test]
    async fn closed_before_request() {
        let io = TestIO::chunked(vec![]);
        let (status, _) = run(&io, &ServerOptions::default()).await;
        assert_eq!(status.unwrap(), ConnectionStatus::Closed);
        assert!(io.written().is_empty());
    }

    #[async_std::test]
    async fn closed_mid_request() {
        let io = TestIO::new("POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        let (status, _) = run(&io, &ServerOptions::default()).await;
        assert!(matches!(status, Err(Error::Io(_))));
        assert!(io.written().is_empty());
    }
}
