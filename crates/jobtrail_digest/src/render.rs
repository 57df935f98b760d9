//! Digest body rendering: plaintext, HTML and Markdown.

use jobtrail_db::EmailCandidate;

fn site_or_unknown(job: &EmailCandidate) -> &str {
    let site = job.site.trim();
    if site.is_empty() {
        "Unknown"
    } else {
        site
    }
}

fn title_or_untitled(job: &EmailCandidate) -> &str {
    let title = job.job_title.trim();
    if title.is_empty() {
        "Untitled"
    } else {
        title
    }
}

pub fn format_plaintext_digest(jobs: &[EmailCandidate]) -> String {
    let mut lines = vec![
        "Job alerts".to_string(),
        String::new(),
        format!("Total new jobs: {}", jobs.len()),
        String::new(),
    ];
    for job in jobs {
        lines.push(format!(
            "- {} | {} | min years: {}",
            site_or_unknown(job),
            title_or_untitled(job),
            job.min_years
        ));
        let url = job.url.trim();
        if !url.is_empty() {
            lines.push(format!("  {url}"));
        }
    }
    let mut body = lines.join("\n").trim().to_string();
    body.push('\n');
    body
}

pub fn format_markdown_digest(jobs: &[EmailCandidate]) -> String {
    let mut lines = vec![
        "# Job alerts".to_string(),
        String::new(),
        format!("Total new jobs: {}", jobs.len()),
        String::new(),
        "| Company | Job title | URL | Min years |".to_string(),
        "|---|---|---|---|".to_string(),
    ];
    for job in jobs {
        let url = job.url.trim();
        let link = if url.is_empty() {
            "Link".to_string()
        } else {
            format!("[Link]({url})")
        };
        lines.push(format!(
            "| {} | {} | {} | {} |",
            site_or_unknown(job),
            title_or_untitled(job),
            link,
            job.min_years
        ));
    }
    let mut body = lines.join("\n").trim().to_string();
    body.push('\n');
    body
}

pub fn format_html_digest(jobs: &[EmailCandidate]) -> String {
    let mut rows = String::new();
    for job in jobs {
        let url = job.url.trim();
        let link = if url.is_empty() {
            "Link".to_string()
        } else {
            format!("<a href=\"{}\">Link</a>", html_escape(url))
        };
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            html_escape(site_or_unknown(job)),
            html_escape(title_or_untitled(job)),
            link,
            job.min_years
        ));
    }

    format!(
        concat!(
            "<html><body>",
            "<h1>Job alerts</h1>",
            "<p>Total new jobs: {count}</p>",
            "<table border=\"1\" cellpadding=\"6\" cellspacing=\"0\" style=\"border-collapse:collapse;\">",
            "<thead>",
            "<tr><th>Company</th><th>Job title</th><th>URL</th><th>Min years</th></tr>",
            "</thead>",
            "<tbody>\n{rows}</tbody>",
            "</table>",
            "</body></html>"
        ),
        count = jobs.len(),
        rows = rows
    )
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
