//! LiveReload protocol v7 messages and the `/changed` request shapes

use serde::{Deserialize, Serialize};

pub const PROTOCOL_V7: &str = "http://livereload.com/protocols/official-7";
pub const SERVER_NAME: &str = "themekit";

/// Messages the server sends to browsers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ServerMessage {
    Hello {
        protocols: Vec<&'static str>,
        #[serde(rename = "serverName")]
        server_name: &'static str,
    },
    Reload {
        path: String,
        #[serde(rename = "liveCSS")]
        live_css: bool,
    },
}

impl ServerMessage {
    pub fn hello() -> Self {
        ServerMessage::Hello {
            protocols: vec![PROTOCOL_V7],
            server_name: SERVER_NAME,
        }
    }

    pub fn reload(path: impl Into<String>) -> Self {
        ServerMessage::Reload {
            path: path.into(),
            live_css: true,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ClientMessage {
    command: String,
}

/// Reply to a client frame; only `hello` gets one
pub fn reply_to(frame: &str) -> Option<String> {
    let message: ClientMessage = serde_json::from_str(frame).ok()?;
    (message.command == "hello").then(|| ServerMessage::hello().to_json())
}

/// Query string of a `/changed` request: `?files=a.css,b.css`
#[derive(Debug, Default, Deserialize)]
pub struct ChangedQuery {
    #[serde(default)]
    pub files: Option<String>,
}

/// JSON body of a `POST /changed` request
#[derive(Debug, Default, Deserialize)]
pub struct ChangedBody {
    #[serde(default)]
    pub files: Vec<String>,
}

/// Files named by a `/changed` request, query list first
pub fn changed_files(query: ChangedQuery, body: ChangedBody) -> Vec<String> {
    let mut files: Vec<String> = query
        .files
        .as_deref()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    files.extend(body.files);
    files
}

/// Client served at `/livereload.js`
pub const CLIENT_SCRIPT: &str = r#"(function () {
  var script = document.currentScript;
  var host = (script && script.src.match(/^\w+:\/\/([^\/]+)/) || [null, location.host])[1];
  function refreshCss() {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    for (var i = 0; i < links.length; i++) {
      var url = links[i].href.replace(/[?&]livereload=\d+/, '');
      links[i].href = url + (url.indexOf('?') < 0 ? '?' : '&') + 'livereload=' + Date.now();
    }
  }
  function connect() {
    var socket = new WebSocket('ws://' + host + '/livereload');
    socket.onopen = function () {
      socket.send(JSON.stringify({ command: 'hello', protocols: ['http://livereload.com/protocols/official-7'] }));
    };
    socket.onmessage = function (event) {
      var message = JSON.parse(event.data);
      if (message.command !== 'reload') return;
      if (message.liveCSS && /\.css$/.test(message.path)) refreshCss();
      else location.reload();
    };
    socket.onclose = function () { setTimeout(connect, 1000); };
  }
  connect();
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_message_shape() {
        assert_eq!(
            ServerMessage::hello().to_json(),
            r#"{"command":"hello","protocols":["http://livereload.com/protocols/official-7"],"serverName":"themekit"}"#
        );
    }

    #[test]
    fn reload_message_shape() {
        assert_eq!(
            ServerMessage::reload("assets/built/screen.css").to_json(),
            r#"{"command":"reload","path":"assets/built/screen.css","liveCSS":true}"#
        );
    }

    #[test]
    fn only_hello_gets_a_reply() {
        assert!(reply_to(r#"{"command":"hello","protocols":[]}"#).is_some());
        assert!(reply_to(r#"{"command":"info","plugins":{},"url":"http://x"}"#).is_none());
        assert!(reply_to("garbage").is_none());
    }

    #[test]
    fn changed_files_from_query_and_body() {
        let query = ChangedQuery {
            files: Some("a.css, ,b.css".to_string()),
        };
        let body = ChangedBody {
            files: vec!["c.css".to_string()],
        };
        assert_eq!(changed_files(query, body), vec!["a.css", "b.css", "c.css"]);
        assert!(changed_files(ChangedQuery::default(), ChangedBody::default()).is_empty());
    }
}
