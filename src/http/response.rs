use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: Cow<'static, str>,
}

impl Response {
    pub fn text(body: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: "text/plain",
            body: body.into(),
        }
    }

    pub fn html(body: &'static str) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: "text/html",
            body: Cow::Borrowed(body),
        }
    }

    pub fn conflict(body: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status: 409,
            reason: "Conflict",
            ..Self::text(body)
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            reason: "Not Found",
            ..Self::text("Not Found")
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason,
            self.content_type,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}
