//! Parsing of `cf COMMAND --help` and `cf help -a` output

use std::fmt;

/// Required and optional help sections, in the order the CLI prints them.
/// Sections not listed here (e.g. `RESOURCES`) may appear anywhere between
/// `USAGE` and `SEE ALSO`.
pub const SECTION_ORDER: [&str; 9] = [
    "NAME",
    "USAGE",
    "WARNING",
    "EXAMPLES",
    "TIP",
    "ALIAS",
    "OPTIONS",
    "ENVIRONMENT",
    "SEE ALSO",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub lines: Vec<String>,
}

impl Section {
    /// Non-empty lines with their indentation removed
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelpError {
    MissingSection(&'static str),
    OutOfOrder { section: String, after: String },
    MalformedName(String),
}

impl fmt::Display for HelpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelpError::MissingSection(title) => write!(f, "missing {}: section", title),
            HelpError::OutOfOrder { section, after } => {
                write!(f, "{}: section appears after {}:", section, after)
            }
            HelpError::MalformedName(line) => {
                write!(f, "NAME: entry is not `command - description`: {:?}", line)
            }
        }
    }
}

impl std::error::Error for HelpError {}

/// A command's help page split into its titled sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpText {
    sections: Vec<Section>,
}

fn section_title(line: &str) -> Option<&str> {
    let title = line.strip_suffix(':')?;
    let is_title = !title.is_empty()
        && !line.starts_with(char::is_whitespace)
        && title
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == ' ' || c == '-');
    is_title.then_some(title)
}

impl HelpText {
    pub fn parse(output: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();
        for line in output.lines() {
            let line = line.trim_end();
            if let Some(title) = section_title(line) {
                sections.push(Section {
                    title: title.to_string(),
                    lines: Vec::new(),
                });
            } else if let Some(current) = sections.last_mut() {
                current.lines.push(line.to_string());
            }
        }
        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn titles(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.title.as_str()).collect()
    }

    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }

    /// `(command, description)` from the NAME section
    pub fn name(&self) -> Result<(String, String), HelpError> {
        let section = self.section("NAME").ok_or(HelpError::MissingSection("NAME"))?;
        let line = section
            .entries()
            .next()
            .ok_or(HelpError::MissingSection("NAME"))?;
        match line.split_once(" - ") {
            Some((name, description)) => Ok((name.trim().to_string(), description.trim().to_string())),
            None => Err(HelpError::MalformedName(line.to_string())),
        }
    }

    pub fn usage(&self) -> Vec<&str> {
        self.section("USAGE")
            .map(|s| s.entries().collect())
            .unwrap_or_default()
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.section("ALIAS")
            .map(|s| s.entries().collect())
            .unwrap_or_default()
    }

    /// Commands listed under SEE ALSO
    pub fn see_also(&self) -> Vec<&str> {
        self.section("SEE ALSO")
            .map(|s| {
                s.entries()
                    .flat_map(|line| line.split(','))
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// NAME then USAGE first, known sections in their fixed relative order,
    /// SEE ALSO last
    pub fn validate(&self) -> Result<(), HelpError> {
        let titles = self.titles();
        match titles.first() {
            Some(&"NAME") => {}
            _ => return Err(HelpError::MissingSection("NAME")),
        }
        match titles.get(1) {
            Some(&"USAGE") => {}
            _ => return Err(HelpError::MissingSection("USAGE")),
        }

        let mut last_known: Option<(usize, &str)> = None;
        for (i, title) in titles.iter().enumerate() {
            if let Some(rank) = SECTION_ORDER.iter().position(|known| known == title) {
                if let Some((prev_rank, prev)) = last_known {
                    if rank < prev_rank {
                        return Err(HelpError::OutOfOrder {
                            section: title.to_string(),
                            after: prev.to_string(),
                        });
                    }
                }
                last_known = Some((rank, *title));
            }
            if i + 1 < titles.len() && *title == "SEE ALSO" {
                return Err(HelpError::OutOfOrder {
                    section: titles[i + 1].to_string(),
                    after: "SEE ALSO".to_string(),
                });
            }
        }
        self.name().map(|_| ())
    }
}

/// One command in the `cf help -a` listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedCommand {
    pub category: String,
    pub name: String,
    pub description: String,
}

/// The global command listing printed by `cf help -a`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandListing {
    commands: Vec<ListedCommand>,
}

impl CommandListing {
    pub fn parse(output: &str) -> Self {
        let mut commands = Vec::new();
        let mut category = String::new();
        for line in output.lines() {
            let line = line.trim_end();
            if let Some(title) = section_title(line) {
                category = title.to_string();
                continue;
            }
            if !line.starts_with(char::is_whitespace) {
                continue;
            }
            // "   name[,alias]   description"; columns are padded with 2+ spaces
            let trimmed = line.trim_start();
            let Some(gap) = trimmed.find("  ") else {
                continue;
            };
            let names = &trimmed[..gap];
            let description = trimmed[gap..].trim();
            let name = names.split(',').next().unwrap_or(names).trim();
            if name.is_empty() || description.is_empty() {
                continue;
            }
            commands.push(ListedCommand {
                category: category.clone(),
                name: name.to_string(),
                description: description.to_string(),
            });
        }
        Self { commands }
    }

    pub fn commands(&self) -> &[ListedCommand] {
        &self.commands
    }

    pub fn find(&self, name: &str) -> Option<&ListedCommand> {
        self.commands.iter().find(|c| c.name == name)
    }

    /// Whether `name` is listed under a category containing `category`
    pub fn has_command_in_category(&self, name: &str, category: &str, description: &str) -> bool {
        self.commands.iter().any(|c| {
            c.name == name && c.category.contains(category) && c.description == description
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABELS_HELP: &str = "NAME:
   labels - List all labels (key-value pairs) for an API resource

USAGE:
   cf labels RESOURCE RESOURCE_NAME

EXAMPLES:
   cf labels app dora
   cf labels org business

RESOURCES:
   app
   org

OPTIONS:
   --stack, -s      Specify stack to disambiguate buildpacks with the same name

SEE ALSO:
   set-label, unset-label
";

    const HELP_ALL: &str = "VERSION:
   7.2.0

GETTING STARTED:
   help                                   Show help
   login,l                                Log user in

METADATA:
   labels                                 List all labels (key-value pairs) for an API resource
   set-label                              Set a label (key-value pairs) for an API resource
";

    #[test]
    fn test_parse_sections() {
        let help = HelpText::parse(LABELS_HELP);
        assert_eq!(
            help.titles(),
            vec!["NAME", "USAGE", "EXAMPLES", "RESOURCES", "OPTIONS", "SEE ALSO"]
        );
        assert_eq!(
            help.name().unwrap(),
            (
                "labels".to_string(),
                "List all labels (key-value pairs) for an API resource".to_string()
            )
        );
        assert_eq!(help.usage(), vec!["cf labels RESOURCE RESOURCE_NAME"]);
        assert_eq!(help.see_also(), vec!["set-label", "unset-label"]);
        help.validate().unwrap();
    }

    #[test]
    fn test_options_before_alias_is_out_of_order() {
        let help = HelpText::parse(
            "NAME:\n   l - x\nUSAGE:\n   cf l\nOPTIONS:\n   -f  force\nALIAS:\n   l\n",
        );
        assert_eq!(
            help.validate(),
            Err(HelpError::OutOfOrder {
                section: "ALIAS".to_string(),
                after: "OPTIONS".to_string()
            })
        );
    }

    #[test]
    fn test_missing_usage() {
        let help = HelpText::parse("NAME:\n   x - y\nOPTIONS:\n   -f\n");
        assert_eq!(help.validate(), Err(HelpError::MissingSection("USAGE")));
    }

    #[test]
    fn test_see_also_must_be_last() {
        let help = HelpText::parse("NAME:\n   x - y\nUSAGE:\n   cf x\nSEE ALSO:\n   z\nRESOURCES:\n   app\n");
        assert!(matches!(help.validate(), Err(HelpError::OutOfOrder { .. })));
    }

    #[test]
    fn test_malformed_name() {
        let help = HelpText::parse("NAME:\n   just-a-name\nUSAGE:\n   cf x\n");
        assert!(matches!(help.validate(), Err(HelpError::MalformedName(_))));
    }

    #[test]
    fn test_parse_listing() {
        let listing = CommandListing::parse(HELP_ALL);
        let labels = listing.find("labels").unwrap();
        assert_eq!(labels.category, "METADATA");
        assert_eq!(
            labels.description,
            "List all labels (key-value pairs) for an API resource"
        );
        assert_eq!(listing.find("login").unwrap().description, "Log user in");
        assert!(listing.has_command_in_category(
            "set-label",
            "METADATA",
            "Set a label (key-value pairs) for an API resource"
        ));
        // VERSION lines have no description column
        assert!(listing.find("7.2.0").is_none());
    }
}
