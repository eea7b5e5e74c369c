//! Server-rendered HTML pages.

use crate::models::file::{FileListing, Visibility};
use std::fmt::Write as _;

pub const CHUNK_UPLOAD_PAGE: &str = include_str!("../templates/file-upload-with-chunks.html");

const HEAD: &str = r#"<!DOCTYPE html><html lang="en"><head><meta charset="utf-8"><link rel="icon" href="/favicon.ico"><style>body{font-family:sans-serif;max-width:44rem;margin:2rem auto}li{margin:.3rem 0}form{display:inline}code{background:#eee;padding:0 .2rem}</style>"#;

/// `GET /get-files`: both namespaces with download links and delete buttons.
pub fn render_file_listing(listing: &FileListing) -> String {
    let mut html = String::from(HEAD);
    html.push_str("<title>Files - Personal Drive</title></head><body>");
    html.push_str("<h1>Personal Drive</h1>");
    html.push_str(r#"<p><a href="/docs">Upload files</a> · <a href="/file-upload-with-chunks">Upload large files</a></p>"#);
    push_section(&mut html, "Public Files", Visibility::Public, &listing.public);
    push_section(&mut html, "Private Files", Visibility::Private, &listing.private);
    html.push_str("</body></html>");
    html
}

fn push_section(html: &mut String, title: &str, visibility: Visibility, keys: &[String]) {
    let _ = write!(html, "<h2>{} ({})</h2>", title, keys.len());
    if keys.is_empty() {
        html.push_str("<p>No files yet.</p>");
        return;
    }
    html.push_str("<ul>");
    for key in keys {
        let name = key.strip_prefix(visibility.prefix()).unwrap_or(key);
        let _ = write!(
            html,
            r#"<li><a href="/{vis}-file/{href}">{label}</a> <form method="post" action="/delete-{vis}-file/{href}"><button type="submit">Delete</button></form></li>"#,
            vis = visibility,
            href = html_escape(&urlencoding::encode(name)),
            label = html_escape(name),
        );
    }
    html.push_str("</ul>");
}

/// `GET /docs`: the API overview the root redirects to.
pub fn render_docs(demo: bool) -> String {
    let mut html = String::from(HEAD);
    html.push_str("<title>Personal Drive</title></head><body>");
    html.push_str("<h1>Personal Drive</h1>");
    html.push_str("<p>Simple dashboard to keep your files safe.</p>");
    if demo {
        html.push_str(
            "<h2>Demo Credentials</h2><ul><li><b>Username:</b> demo</li><li><b>Password:</b> demo</li></ul>\
             <p>The demo is read-only: uploads and deletes are refused.</p>",
        );
    }
    html.push_str(
        "<p>Files are either <b>public</b> (anyone with the link can download them) or \
         <b>private</b> (downloads need the admin username and password). \
         Every other endpoint uses HTTP Basic authentication with the configured \
         <code>ADMIN_USERNAME</code> and <code>ADMIN_PASSWORD</code>.</p>",
    );
    html.push_str(r#"<p><a href="/get-files">Show All Files</a></p>"#);
    html.push_str("<h2>Endpoints</h2><table><tr><th>Method</th><th>Path</th><th>Purpose</th></tr>");
    for (method, path, purpose) in ENDPOINTS {
        let _ = write!(
            html,
            "<tr><td>{}</td><td><code>{}</code></td><td>{}</td></tr>",
            method,
            html_escape(path),
            purpose
        );
    }
    html.push_str("</table>");
    html.push_str(
        r#"<h2>Upload</h2>
<form method="post" action="/public-file" enctype="multipart/form-data"><input type="file" name="file" required> <button type="submit">Upload public file</button></form>
<br><br>
<form method="post" action="/private-file" enctype="multipart/form-data"><input type="file" name="file" required> <button type="submit">Upload private file</button></form>
<p>Uploading a file with an existing name replaces it.</p>"#,
    );
    html.push_str("</body></html>");
    html
}

const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("POST", "/public-file", "Upload or replace a public file (form field <code>file</code>)"),
    ("POST", "/private-file", "Upload or replace a private file (form field <code>file</code>)"),
    ("GET", "/get-files", "HTML listing of public and private files"),
    ("POST", "/get-files", "JSON listing of every stored key"),
    ("GET", "/public-file/{name}", "Download a public file, no authentication"),
    ("GET", "/private-file/{name}", "Download a private file"),
    ("POST", "/delete-public-file/{name}", "Delete a public file"),
    ("POST", "/delete-private-file/{name}", "Delete a private file"),
    ("GET", "/file-upload-with-chunks", "Upload large files in parts"),
    ("POST", "/upload-public-file-part", "Send one part of a public chunked upload"),
    ("POST", "/upload-private-file-part", "Send one part of a private chunked upload"),
];

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_links_each_namespace_and_escapes_names() {
        let listing = FileListing::from_keys(["public/a b.txt", "private/<x>.html"]);
        let html = render_file_listing(&listing);

        assert!(html.contains(r#"href="/public-file/a%20b.txt""#));
        assert!(html.contains(r#"action="/delete-public-file/a%20b.txt""#));
        assert!(html.contains(r#"href="/private-file/%3Cx%3E.html""#));
        assert!(html.contains("&lt;x&gt;.html"));
        assert!(!html.contains("<x>"));
    }

    #[test]
    fn listing_hrefs_encode_reserved_and_non_ascii_bytes() {
        let listing = FileListing::from_keys(["public/q&a ü.txt"]);
        let html = render_file_listing(&listing);
        assert!(html.contains(r#"href="/public-file/q%26a%20%C3%BC.txt""#));
        assert!(html.contains(">q&amp;a ü.txt</a>"));
    }

    #[test]
    fn docs_show_demo_credentials_only_in_demo() {
        assert!(render_docs(true).contains("Demo Credentials"));
        assert!(!render_docs(false).contains("Demo Credentials"));
    }
}
