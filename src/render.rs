// src/render.rs

//! Human-readable HTML views.
//!
//! Pure functions from decoded records to bytes. Views are derived output:
//! they can be deleted and regenerated from chunk files at any time.

use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::models::{Extract, Item, SourceProfile};
use crate::pipeline::index::RecordIndex;

/// One table column of a chunk view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Value is markup taken from the page and is emitted unescaped
    pub raw_html: bool,
}

impl Column {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_html: false,
        }
    }

    pub fn html(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_html: true,
        }
    }
}

/// Table columns for a source profile, in field order.
pub fn columns_for(profile: &SourceProfile) -> Vec<Column> {
    let mut columns: Vec<Column> = profile
        .fields
        .iter()
        .map(|f| Column {
            name: f.name.clone(),
            raw_html: f.extract == Extract::Html,
        })
        .collect();
    if profile.articles.is_some() {
        columns.push(Column::html("articles"));
    }
    columns
}

const STYLE: &str = "body{font-family:sans-serif;margin:1em}\
table{border-collapse:collapse;width:100%}\
th,td{border:1px solid #ccc;padding:4px;vertical-align:top;text-align:right}\
th{background:#eee;cursor:pointer}\
#search{width:40%;padding:4px;margin-bottom:1em}\
tr:target{background:#ffd}";

const SCRIPT: &str = r##"function filterRows(){var q=document.getElementById("search").value.toLowerCase();
var rows=document.querySelectorAll("#records tbody tr");
for(var i=0;i<rows.length;i++){rows[i].style.display=rows[i].textContent.toLowerCase().indexOf(q)>-1?"":"none";}}
function sortTable(n){var t=document.getElementById("records"),b=t.tBodies[0],r=Array.prototype.slice.call(b.rows);
var asc=t.getAttribute("data-sort")!==String(n);
r.sort(function(a,c){var x=a.cells[n].textContent,y=c.cells[n].textContent;return asc?x.localeCompare(y):y.localeCompare(x);});
for(var i=0;i<r.length;i++){b.appendChild(r[i]);}t.setAttribute("data-sort",asc?String(n):"");}"##;

fn open_document(out: &mut String, title: &str) {
    let title = encode_text(title);
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"ar\" dir=\"rtl\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n"
    );
}

fn close_document(out: &mut String) {
    let _ = write!(out, "<script>\n{SCRIPT}\n</script>\n</body>\n</html>\n");
}

/// Render one chunk as a searchable, sortable table.
///
/// Each row is anchored as `item-{id}` so the index can deep-link to it.
pub fn render_chunk(title: &str, columns: &[Column], items: &[Item]) -> Vec<u8> {
    let mut out = String::new();
    open_document(&mut out, title);

    out.push_str(
        "<input type=\"text\" id=\"search\" onkeyup=\"filterRows()\" placeholder=\"بحث...\">\n",
    );
    out.push_str("<table id=\"records\">\n<thead><tr>");
    let headers = ["id", "year"]
        .into_iter()
        .chain(columns.iter().map(|c| c.name.as_str()));
    for (n, header) in headers.enumerate() {
        let _ = write!(out, "<th onclick=\"sortTable({n})\">{}</th>", encode_text(header));
    }
    out.push_str("</tr></thead>\n<tbody>\n");

    for item in items {
        let id = item.id.as_str();
        let _ = write!(
            out,
            "<tr id=\"item-{}\"><td><a href=\"{}\">{}</a></td><td>{}</td>",
            encode_double_quoted_attribute(id),
            encode_double_quoted_attribute(&item.url),
            encode_text(id),
            item.partition
        );
        for column in columns {
            let value = item.field_or_empty(&column.name);
            if column.raw_html {
                let _ = write!(out, "<td>{value}</td>");
            } else {
                let _ = write!(out, "<td>{}</td>", encode_text(value));
            }
        }
        out.push_str("</tr>\n");
    }

    out.push_str("</tbody>\n</table>\n");
    close_document(&mut out);
    out.into_bytes()
}

/// Render the partition index with deep links into chunk views.
pub fn render_index(title: &str, index: &RecordIndex) -> Vec<u8> {
    let mut out = String::new();
    open_document(&mut out, title);

    let _ = writeln!(
        out,
        "<p>{} records in {} chunks</p>",
        index.record_count(),
        index.chunks.len()
    );

    out.push_str("<ul>\n");
    for partition in index.partitions.keys() {
        let _ = writeln!(out, "<li><a href=\"#year-{partition}\">{partition}</a></li>");
    }
    out.push_str("</ul>\n");

    for (partition, entries) in &index.partitions {
        let _ = writeln!(
            out,
            "<h2 id=\"year-{partition}\">{partition} ({})</h2>\n<ol>",
            entries.len()
        );
        for entry in entries {
            let id = entry.item_id.as_str();
            let _ = writeln!(
                out,
                "<li><a href=\"{}.html#item-{}\">{}</a></li>",
                encode_double_quoted_attribute(&entry.chunk_file),
                encode_double_quoted_attribute(id),
                encode_text(id)
            );
        }
        out.push_str("</ol>\n");
    }

    close_document(&mut out);
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemId, Partition, SourceKind};
    use crate::pipeline::index::IndexBuilder;

    fn ruling(id: &str) -> Item {
        Item::new(ItemId::new(id), Partition(2020), format!("https://example.com/?ID={id}&a=b"))
            .with_field("court", "<محكمة & تمييز>")
            .with_field("full_text", "<p>نص</p>")
    }

    #[test]
    fn test_columns_follow_profile() {
        let rulings = columns_for(&SourceProfile::for_kind(SourceKind::Rulings));
        assert_eq!(rulings[0], Column::text("court"));
        assert!(rulings.iter().any(|c| c == &Column::html("full_text")));

        let laws = columns_for(&SourceProfile::for_kind(SourceKind::Laws));
        assert_eq!(laws.last(), Some(&Column::html("articles")));
    }

    #[test]
    fn test_render_chunk_escapes_text_and_anchors_rows() {
        let columns = vec![Column::text("court"), Column::html("full_text")];
        let html = String::from_utf8(render_chunk("rulings_0001", &columns, &[ruling("7")])).unwrap();

        assert!(html.contains("dir=\"rtl\""));
        assert!(html.contains("id=\"search\""));
        assert!(html.contains("<tr id=\"item-7\">"));
        assert!(html.contains("&lt;محكمة &amp; تمييز&gt;"));
        assert!(html.contains("<td><p>نص</p></td>"));
        assert!(html.contains("href=\"https://example.com/?ID=7&amp;a=b\""));
    }

    #[test]
    fn test_render_index_links_into_chunk_views() {
        let mut builder = IndexBuilder::new();
        builder.add_chunk(1, "rulings_0001_2020-2020");
        builder.add_record(Partition(2020), ItemId::new("7"), 1, "rulings_0001_2020-2020");
        let index = builder.build();

        let html = String::from_utf8(render_index("rulings", &index)).unwrap();
        assert!(html.contains("href=\"rulings_0001_2020-2020.html#item-7\""));
        assert!(html.contains("id=\"year-2020\""));
    }

    #[test]
    fn test_view_script_is_embedded_whole() {
        let html = String::from_utf8(render_chunk("t", &[Column::text("court")], &[])).unwrap();
        assert!(html.contains("querySelectorAll(\"#records tbody tr\")"));
        assert!(html.contains("function sortTable(n)"));
        assert!(html.contains("t.setAttribute(\"data-sort\",asc?String(n):\"\");}\n</script>"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let columns = vec![Column::text("court")];
        let items = [ruling("1"), ruling("2")];
        assert_eq!(
            render_chunk("t", &columns, &items),
            render_chunk("t", &columns, &items)
        );
    }
}
