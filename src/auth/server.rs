//! Loopback listener that captures the authorization-code redirect.

use super::AuthError;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

/// Redirect path registered with the identity provider.
pub const CALLBACK_PATH: &str = "/callback";

/// Authorization code captured from the redirect.
#[derive(Debug, Clone)]
pub struct CallbackResult {
    pub code: String,
}

/// One-shot HTTP listener for the login redirect.
pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
    expected_state: String,
}

impl CallbackServer {
    /// Bind the configured loopback port.
    ///
    /// The port is fixed: it must match the redirect URI registered with
    /// the realm client, so there is no fallback to an ephemeral port.
    pub fn bind(port: u16, expected_state: String) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        let port = listener.local_addr()?.port();

        // Non-blocking so the accept loop can enforce the timeout.
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            port,
            expected_state,
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to send the provider to.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{CALLBACK_PATH}", self.port)
    }

    /// Block until the provider redirects back, or the timeout passes.
    pub fn wait_for_callback(self, timeout: Duration) -> Result<CallbackResult, AuthError> {
        let (tx, rx) = mpsc::channel();
        let expected_state = self.expected_state;
        let listener = self.listener;

        thread::spawn(move || {
            let outcome = accept_loop(&listener, &expected_state, timeout);
            let _ = tx.send(outcome);
        });

        rx.recv_timeout(timeout)
            .map_err(|_| AuthError::Callback("timed out waiting for login redirect".to_string()))?
    }
}

fn accept_loop(
    listener: &TcpListener,
    expected_state: &str,
    timeout: Duration,
) -> Result<CallbackResult, AuthError> {
    let deadline = Instant::now() + timeout;

    loop {
        if Instant::now() >= deadline {
            return Err(AuthError::Callback(
                "timed out waiting for login redirect".to_string(),
            ));
        }

        match listener.accept() {
            Ok((mut stream, _)) => {
                if let Some(result) = serve_connection(&mut stream, expected_state)? {
                    return Ok(result);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Handle one connection. `Ok(None)` means keep accepting (unreadable
/// request or a stray path); a bad redirect is a hard error.
fn serve_connection(
    stream: &mut TcpStream,
    expected_state: &str,
) -> Result<Option<CallbackResult>, AuthError> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;

    let mut buffer = [0u8; 4096];
    let Ok(read) = stream.read(&mut buffer) else {
        return Ok(None);
    };
    let request = String::from_utf8_lossy(&buffer[..read]);

    let Some(target) = request_target(&request) else {
        return Ok(None);
    };
    if !target.starts_with(CALLBACK_PATH) {
        respond(stream, 404, "Not Found", "")?;
        return Ok(None);
    }

    match parse_redirect(&target, expected_state) {
        Ok(result) => {
            respond(stream, 200, "OK", SUCCESS_PAGE)?;
            Ok(Some(result))
        }
        Err(err) => {
            respond(stream, 400, "Bad Request", &failure_page(&err.to_string()))?;
            Err(err)
        }
    }
}

/// Extract the target of a `GET <target> HTTP/1.1` request line.
fn request_target(request: &str) -> Option<String> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    parts.next().map(str::to_string)
}

fn parse_redirect(target: &str, expected_state: &str) -> Result<CallbackResult, AuthError> {
    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|err| AuthError::Callback(format!("unparseable redirect: {err}")))?;
    let params: HashMap<_, _> = url.query_pairs().collect();

    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(std::string::ToString::to_string)
            .unwrap_or_default();
        return Err(AuthError::Callback(format!("{error}: {description}")));
    }

    let state = params
        .get("state")
        .ok_or_else(|| AuthError::Callback("missing state parameter".to_string()))?;
    if state.as_ref() != expected_state {
        return Err(AuthError::Callback("state mismatch".to_string()));
    }

    let code = params
        .get("code")
        .ok_or_else(|| AuthError::Callback("missing authorization code".to_string()))?;

    Ok(CallbackResult {
        code: code.to_string(),
    })
}

fn respond(stream: &mut TcpStream, status: u16, reason: &str, body: &str) -> Result<(), AuthError> {
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

const SUCCESS_PAGE: &str = r"<!DOCTYPE html>
<html>
<head>
    <title>Signed In</title>
    <style>
        body { font-family: system-ui, sans-serif; text-align: center; padding: 50px; }
        h1 { color: #22c55e; }
    </style>
</head>
<body>
    <h1>Signed in</h1>
    <p>You can close this tab and return to usersync.</p>
</body>
</html>";

fn failure_page(detail: &str) -> String {
    format!(
        r"<!DOCTYPE html>
<html>
<head>
    <title>Sign-In Failed</title>
    <style>
        body {{ font-family: system-ui, sans-serif; text-align: center; padding: 50px; }}
        h1 {{ color: #ef4444; }}
    </style>
</head>
<body>
    <h1>Sign-in failed</h1>
    <p>{}</p>
    <p>Please try again.</p>
</body>
</html>",
        html_escape(detail)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_redirect_success() {
        let target = "/callback?code=abc123&state=xyz789";
        let result = parse_redirect(target, "xyz789").unwrap();
        assert_eq!(result.code, "abc123");
    }

    #[test]
    fn test_parse_redirect_state_mismatch() {
        let target = "/callback?code=abc123&state=wrong";
        let err = parse_redirect(target, "expected").unwrap_err();
        assert!(err.to_string().contains("state mismatch"));
    }

    #[test]
    fn test_parse_redirect_provider_error() {
        let target = "/callback?error=access_denied&error_description=User%20denied%20access";
        let err = parse_redirect(target, "any").unwrap_err();
        assert!(err.to_string().contains("access_denied"));
        assert!(err.to_string().contains("User denied access"));
    }

    #[test]
    fn test_parse_redirect_missing_code() {
        let target = "/callback?state=xyz789";
        let err = parse_redirect(target, "xyz789").unwrap_err();
        assert!(err.to_string().contains("missing authorization code"));
    }

    #[test]
    fn test_request_target() {
        assert_eq!(
            request_target("GET /callback?code=1 HTTP/1.1\r\nHost: x\r\n\r\n").as_deref(),
            Some("/callback?code=1")
        );
        assert_eq!(request_target("POST /callback HTTP/1.1"), None);
        assert_eq!(request_target(""), None);
    }
}
