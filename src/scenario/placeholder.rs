use std::collections::BTreeMap;

/// Values for `${name}` placeholders of one scenario
pub type Bindings = BTreeMap<String, String>;

/// Names of every `${...}` placeholder in `template`, in order
pub fn placeholders(template: &str) -> Result<Vec<&str>, String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("Unterminated placeholder in {:?}", template))?;
        let name = &after[..end];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("Invalid placeholder ${{{}}} in {:?}", name, template));
        }
        names.push(name);
        rest = &after[end + 1..];
    }
    Ok(names)
}

fn substitute<F>(template: &str, bindings: &Bindings, render: F) -> Result<String, String>
where
    F: Fn(&str) -> String,
{
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("Unterminated placeholder in {:?}", template))?;
        let name = &after[..end];
        let value = bindings
            .get(name)
            .ok_or_else(|| format!("Unknown placeholder ${{{}}}", name))?;
        result.push_str(&render(value));
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

/// Replace placeholders with their values verbatim (arguments, stdin, env)
pub fn resolve(template: &str, bindings: &Bindings) -> Result<String, String> {
    substitute(template, bindings, str::to_string)
}

/// Replace placeholders with regex-escaped values (output patterns)
pub fn resolve_pattern(template: &str, bindings: &Bindings) -> Result<String, String> {
    substitute(template, bindings, regex::escape)
}

pub fn resolve_all(templates: &[String], bindings: &Bindings) -> Result<Vec<String>, String> {
    templates.iter().map(|t| resolve(t, bindings)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        let mut b = Bindings::new();
        b.insert("org".to_string(), "INTEGRATION-ORG-1".to_string());
        b.insert("app".to_string(), "my.app".to_string());
        b
    }

    #[test]
    fn test_resolve() {
        assert_eq!(
            resolve("target -o ${org}", &bindings()).unwrap(),
            "target -o INTEGRATION-ORG-1"
        );
        assert_eq!(resolve("no placeholders", &bindings()).unwrap(), "no placeholders");
    }

    #[test]
    fn test_resolve_pattern_escapes_values() {
        assert_eq!(
            resolve_pattern(r"name:\s+${app}", &bindings()).unwrap(),
            r"name:\s+my\.app"
        );
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = resolve("${space}", &bindings()).unwrap_err();
        assert!(err.contains("${space}"));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders("${org} and ${other_org}").unwrap(), vec!["org", "other_org"]);
        assert!(placeholders("${org").is_err());
        assert!(placeholders("${bad name}").is_err());
        // a bare `$` is ordinary text, e.g. a regex anchor
        assert!(placeholders("OK$").unwrap().is_empty());
    }
}
