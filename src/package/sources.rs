//! Parsing and editing of apt source definitions.
//!
//! Two formats coexist on modern hosts: one-line `.list` files
//! (`deb [opts] uri suite component...`) and deb822 `.sources` stanzas.
//! Editors return the new content plus how many entries they changed so the
//! caller can skip writing untouched files.

use super::AptRepo;

struct OneLine<'a> {
    kind: &'a str,
    uri: &'a str,
    suite: &'a str,
    components: Vec<&'a str>,
}

/// Split a one-line source, dropping the optional `[arch=... signed-by=...]` block.
fn parse_one_line(line: &str) -> Option<OneLine<'_>> {
    let line = line.split('#').next().unwrap_or("").trim();
    let (kind, rest) = line.split_once(char::is_whitespace)?;
    if kind != "deb" && kind != "deb-src" {
        return None;
    }
    let mut rest = rest.trim_start();
    if rest.starts_with('[') {
        let end = rest.find(']')?;
        rest = rest[end + 1..].trim_start();
    }
    let mut fields = rest.split_whitespace();
    let uri = fields.next()?;
    let suite = fields.next()?;
    Some(OneLine {
        kind,
        uri,
        suite,
        components: fields.collect(),
    })
}

fn expand(uri: &str, suite: &str, components: &[&str]) -> Vec<AptRepo> {
    if components.is_empty() {
        return vec![AptRepo::new(uri, suite, "")];
    }
    components
        .iter()
        .map(|component| AptRepo::new(uri, suite, component))
        .collect()
}

/// Active `deb` entries of a `.list` file, one per component.
pub fn parse_list(content: &str) -> Vec<AptRepo> {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(parse_one_line)
        .filter(|source| source.kind == "deb")
        .flat_map(|source| expand(source.uri, source.suite, &source.components))
        .collect()
}

/// Comment out active lines (binary and source) for `suite`.
pub fn disable_list_suite(content: &str, suite: &str) -> (String, usize) {
    let mut changed = 0;
    let lines: Vec<String> = content
        .lines()
        .map(|line| {
            let active = !line.trim_start().starts_with('#');
            if active && parse_one_line(line).is_some_and(|s| s.suite == suite) {
                changed += 1;
                format!("# {}", line)
            } else {
                line.to_string()
            }
        })
        .collect();
    (rejoin(content, lines), changed)
}

/// Uncomment a disabled `deb` line providing `repo`. Returns `None` if there is none.
pub fn enable_list_entry(content: &str, repo: &AptRepo) -> Option<String> {
    let mut found = false;
    let lines: Vec<String> = content
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if found || !trimmed.starts_with('#') {
                return line.to_string();
            }
            let body = trimmed.trim_start_matches('#').trim_start();
            let provides = parse_one_line(body).is_some_and(|source| {
                source.kind == "deb"
                    && expand(source.uri, source.suite, &source.components)
                        .iter()
                        .any(|r| r.same_source(repo))
            });
            if provides {
                found = true;
                body.to_string()
            } else {
                line.to_string()
            }
        })
        .collect();
    found.then(|| rejoin(content, lines))
}

fn rejoin(original: &str, lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    if original.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// One deb822 paragraph, kept as raw lines so edits preserve formatting.
struct Stanza {
    lines: Vec<String>,
}

impl Stanza {
    fn field(&self, name: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            if line.starts_with(char::is_whitespace) || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    fn set_field(&mut self, name: &str, value: &str) {
        let replacement = format!("{}: {}", name, value);
        let existing = self.lines.iter().position(|line| {
            !line.starts_with(char::is_whitespace)
                && line
                    .split_once(':')
                    .is_some_and(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        });
        match existing {
            Some(idx) => self.lines[idx] = replacement,
            None => self.lines.push(replacement),
        }
    }

    fn words(&self, name: &str) -> Vec<&str> {
        self.field(name)
            .map(|v| v.split_whitespace().collect())
            .unwrap_or_default()
    }

    fn enabled(&self) -> bool {
        !self
            .field("Enabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("no"))
    }
}

fn parse_stanzas(content: &str) -> Vec<Stanza> {
    let mut stanzas = Vec::new();
    let mut current = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                stanzas.push(Stanza {
                    lines: std::mem::take(&mut current),
                });
            }
        } else {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        stanzas.push(Stanza { lines: current });
    }
    stanzas
}

fn render_stanzas(stanzas: &[Stanza]) -> String {
    let mut out = stanzas
        .iter()
        .map(|s| s.lines.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

/// Enabled `deb` entries of a deb822 `.sources` file.
pub fn parse_deb822(content: &str) -> Vec<AptRepo> {
    let mut repos = Vec::new();
    for stanza in parse_stanzas(content) {
        if !stanza.enabled() || !stanza.words("Types").contains(&"deb") {
            continue;
        }
        let components = stanza.words("Components");
        for uri in stanza.words("URIs") {
            for suite in stanza.words("Suites") {
                repos.extend(expand(uri, suite, &components));
            }
        }
    }
    repos
}

/// Drop `suites` from every stanza. A stanza left without suites is disabled instead.
pub fn disable_deb822_suites(content: &str, suites: &[&str]) -> (String, usize) {
    let mut stanzas = parse_stanzas(content);
    let mut changed = 0;
    for stanza in &mut stanzas {
        if !stanza.enabled() {
            continue;
        }
        let current: Vec<String> = stanza.words("Suites").iter().map(|s| s.to_string()).collect();
        if !current.iter().any(|s| suites.contains(&s.as_str())) {
            continue;
        }
        let remaining: Vec<&str> = current
            .iter()
            .map(String::as_str)
            .filter(|s| !suites.contains(s))
            .collect();
        if remaining.is_empty() {
            stanza.set_field("Enabled", "no");
        } else {
            stanza.set_field("Suites", &remaining.join(" "));
        }
        changed += 1;
    }
    if changed == 0 {
        return (content.to_string(), 0);
    }
    (render_stanzas(&stanzas), changed)
}
