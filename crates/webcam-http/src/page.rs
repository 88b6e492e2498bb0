/// Index page: live feed when streaming, controls either way.
pub fn render_index(streaming: bool, camera_open: bool) -> String {
    let feed = if streaming {
        r#"<img id="feed" src="/video_feed" alt="Live camera feed">"#
    } else {
        r#"<p id="feed">Streaming is stopped.</p>"#
    };
    let status = match (streaming, camera_open) {
        (true, true) => "streaming",
        (true, false) => "streaming requested, camera closed",
        (false, true) => "stopped, camera open",
        (false, false) => "stopped",
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Webcam</title>
</head>
<body>
<h1>Webcam</h1>
<p>Status: <span id="status">{status}</span></p>
{feed}
<form method="post" action="/start_stream"><button type="submit">Start stream</button></form>
<form method="post" action="/stop_stream"><button type="submit">Stop stream</button></form>
<form method="post" action="/capture"><button type="submit">Capture frame</button></form>
</body>
</html>
"#
    )
}
