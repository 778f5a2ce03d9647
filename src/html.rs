use crate::models::marker::MapMarker;
use crate::pictures::DirEntry;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// URL パスに埋め込むときにエンコードする文字 (`/` は残す)
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const LAYOUT_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>__TITLE__</title>
  __HEAD__
  <style>
    body { font-family: system-ui, sans-serif; margin: 0; color: #1f2933; }
    header { background: #243b53; padding: 0.75rem 1rem; }
    header a { color: #f0f4f8; margin-right: 1rem; text-decoration: none; }
    main { padding: 1rem; }
    table { border-collapse: collapse; }
    td, th { border: 1px solid #d9e2ec; padding: 0.25rem 0.5rem; text-align: left; }
    #map { height: 70vh; width: 100%; }
    .gallery img { max-width: 320px; margin: 0.25rem; }
  </style>
</head>
<body>
  <header>
    <a href="/">Home</a><a href="/map">Map</a><a href="/uploader">Upload</a><a href="/iotpost">IoT</a>
  </header>
  <main>
__BODY__
  </main>
</body>
</html>
"#;

const MAP_HEAD_HTML: &str = r#"<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" crossorigin="" />
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js" crossorigin=""></script>"#;

const MAP_SCRIPT_HTML: &str = r#"<div id="map"></div>
<script>
  const markers = __MARKERS__;
  const map = L.map('map');
  L.tileLayer('https://tile.openstreetmap.org/{z}/{x}/{y}.png', {
    maxZoom: 19,
    attribution: '&copy; OpenStreetMap contributors'
  }).addTo(map);

  const bounds = [];
  for (const m of markers) {
    const lat = parseFloat(m.lat);
    const lng = parseFloat(m.lng);
    if (Number.isNaN(lat) || Number.isNaN(lng)) continue;

    const popup = document.createElement('div');
    const lines = [
      m.name + ' (' + m.dev + ')',
      'IMEI: ' + m.imei,
      'Reports: ' + m.count,
      m.lastSeen ? m.firstSeen + ' to ' + m.lastSeen : m.firstSeen,
    ];
    for (const line of lines) {
      const p = document.createElement('div');
      p.textContent = line;
      popup.appendChild(p);
    }
    L.marker([lat, lng]).addTo(map).bindPopup(popup);
    bounds.push([lat, lng]);
  }
  if (bounds.length > 0) {
    map.fitBounds(bounds, { maxZoom: 16, padding: [24, 24] });
  } else {
    map.setView([0, 0], 2);
  }
</script>"#;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH).to_string()
}

fn page(title: &str, head: &str, body: &str) -> String {
    LAYOUT_HTML
        .replace("__TITLE__", &escape(title))
        .replace("__HEAD__", head)
        .replace("__BODY__", body)
}

fn directory_list(entries: &[DirEntry]) -> String {
    if entries.is_empty() {
        return "<p>No pictures yet.</p>".into();
    }
    let items: String = entries
        .iter()
        .map(|e| {
            format!(
                "<li><a href=\"/pictures/{}\">{}</a></li>\n",
                escape(&encode_path(&e.path)),
                escape(&e.name)
            )
        })
        .collect();
    format!("<ul>\n{}</ul>", items)
}

pub fn landing(directories: &[DirEntry]) -> String {
    let body = format!(
        "<h1>GPS tracker</h1>\n\
         <p>Devices report positions to <code>/gps/{{lng}},{{lat}},{{imei}},{{dev}},{{name}}</code> \
         or anonymously to <code>/gpsa/{{lng}},{{lat}}</code>.</p>\n\
         <p><a href=\"/map\">Show the map</a></p>\n\
         <h2>Pictures</h2>\n{}",
        directory_list(directories)
    );
    page("GPS tracker", "", &body)
}

pub fn gps_confirmation(coordinate1: &str, coordinate2: &str) -> String {
    let body = format!(
        "<h1>Position received</h1>\n<p>Coordinates: {}, {}</p>\n<p><a href=\"/map\">Show the map</a></p>",
        escape(coordinate1),
        escape(coordinate2)
    );
    page("Position received", "", &body)
}

pub fn map(markers: &[MapMarker]) -> Result<String, serde_json::Error> {
    // </script> で閉じられないようにする
    let data = serde_json::to_string(markers)?.replace("</", "<\\/");
    let rows: String = markers
        .iter()
        .map(|m| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&m.coordinate_key),
                escape(&m.imei),
                escape(&m.dev),
                escape(&m.name),
                m.count,
                escape(&m.first_seen.format()),
                m.last_seen.map(|t| escape(&t.format())).unwrap_or_default(),
            )
        })
        .collect();
    let body = format!(
        "<h1>Reported positions</h1>\n{}\n\
         <table>\n<tr><th>Position</th><th>IMEI</th><th>Device</th><th>Name</th>\
         <th>Reports</th><th>First seen</th><th>Last seen</th></tr>\n{}</table>\n\
         <form method=\"post\" action=\"/clear\"><button type=\"submit\">Clear positions</button></form>",
        MAP_SCRIPT_HTML.replace("__MARKERS__", &data),
        rows
    );
    Ok(page("Map", MAP_HEAD_HTML, &body))
}

pub fn iotpost() -> String {
    let body = "<h1>Posting from a device</h1>\n\
        <p>Send a GET or POST request for every fix:</p>\n\
        <pre>/gps/&lt;longitude&gt;,&lt;latitude&gt;,&lt;imei&gt;,&lt;device&gt;,&lt;name&gt;</pre>\n\
        <p>Devices without an identity can use:</p>\n\
        <pre>/gpsa/&lt;longitude&gt;,&lt;latitude&gt;</pre>\n\
        <p>Repeated reports of the same position from the same IMEI are shown as one marker with a count.</p>";
    page("IoT post", "", body)
}

pub fn directory(path: &str, entries: &[DirEntry]) -> String {
    let body = format!("<h1>/{}</h1>\n{}", escape(path), directory_list(entries));
    page("Pictures", "", &body)
}

pub fn gallery(path: &str, keys: &[String]) -> String {
    let images: String = keys
        .iter()
        .map(|key| {
            format!(
                "<a href=\"/images/{0}\"><img src=\"/images/{0}\" alt=\"{1}\" /></a>\n",
                escape(&encode_path(key)),
                escape(key)
            )
        })
        .collect();
    let body = format!(
        "<h1>/{}</h1>\n<div class=\"gallery\">\n{}</div>",
        escape(path),
        images
    );
    page("Pictures", "", &body)
}

pub fn uploader_form() -> String {
    let body = "<h1>Upload a picture</h1>\n\
        <form method=\"post\" action=\"/uploader\" enctype=\"multipart/form-data\">\n\
        <input type=\"file\" name=\"file\" />\n\
        <button type=\"submit\">Upload</button>\n\
        </form>";
    page("Upload", "", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::received::Received;

    fn marker(name: &str) -> MapMarker {
        MapMarker {
            coordinate_key: "{lat: 40.0, lng: -75.0}".into(),
            lat: "40.0".into(),
            lng: "-75.0".into(),
            first_seen: Received::parse("March 09, 2017 - 10:00:00 AM EST").unwrap(),
            last_seen: Some(Received::parse("March 09, 2017 - 10:05:00 AM EST").unwrap()),
            imei: "X".into(),
            dev: "tracker".into(),
            name: name.into(),
            count: 2,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_map_embeds_markers_as_json() {
        let html = map(&[marker("alice")]).unwrap();
        assert!(html.contains(r#""coordinateKey":"{lat: 40.0, lng: -75.0}""#));
        assert!(html.contains(r#""firstSeen":"March 09, 2017 - 10:00:00 AM EST""#));
        assert!(html.contains(r#""lastSeen":"March 09, 2017 - 10:05:00 AM EST""#));
        assert!(html.contains(r#""count":2"#));
        assert!(html.contains("<td>alice</td>"));
        assert!(!html.contains("__MARKERS__"));
    }

    #[test]
    fn test_map_cannot_break_out_of_script() {
        let html = map(&[marker("</script><script>alert(1)</script>")]).unwrap();
        assert!(!html.contains("</script><script>alert(1)"));
        assert!(html.contains("&lt;/script&gt;"));
    }

    #[test]
    fn test_map_without_markers() {
        let html = map(&[]).unwrap();
        assert!(html.contains("const markers = [];"));
    }

    #[test]
    fn test_gps_confirmation_escapes_tokens() {
        let html = gps_confirmation("-75.0", "<b>40</b>");
        assert!(html.contains("Coordinates: -75.0, &lt;b&gt;40&lt;/b&gt;"));
    }

    #[test]
    fn test_directory_links_are_encoded() {
        let entries = vec![DirEntry {
            path: "2017/My Trip".into(),
            name: "My Trip".into(),
        }];
        let html = directory("2017", &entries);
        assert!(html.contains(r#"<a href="/pictures/2017/My%20Trip">My Trip</a>"#));
    }

    #[test]
    fn test_gallery_links_images() {
        let html = gallery("dir", &["dir/a.jpg".to_string()]);
        assert!(html.contains(r#"<img src="/images/dir/a.jpg" alt="dir/a.jpg" />"#));
    }

    #[test]
    fn test_landing_without_pictures() {
        let html = landing(&[]);
        assert!(html.contains("No pictures yet."));
        assert!(html.contains("/gps/{lng},{lat},{imei},{dev},{name}"));
    }
}
