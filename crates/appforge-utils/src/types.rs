use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Output targets supported by the generator.
///
/// Each platform maps onto one framework and one output directory:
///
/// | Platform | Framework | Directory | Entry point |
/// |----------|-----------|-----------|-------------|
/// | `Web` | React | `web/` | `src/index.js` |
/// | `Desktop` | Electron | `desktop/` | `main.js` |
/// | `Mobile` | NativeScript | `mobile/` | `app.js` |
/// | `Server` | Node.js | `server/` | `server.js` |
///
/// # Example
///
/// ```rust
/// use appforge_utils::types::Platform;
///
/// let platform: Platform = "react".parse().unwrap();
/// assert_eq!(platform, Platform::Web);
/// assert_eq!(platform.entry_point(), "src/index.js");
/// ```
///
/// # Serialization
///
/// `Platform` serializes to its lowercase name (e.g., `"web"`, `"mobile"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Desktop,
    Mobile,
    Server,
}

impl Platform {
    /// All platforms in canonical order.
    pub const ALL: [Platform; 4] = [
        Platform::Web,
        Platform::Desktop,
        Platform::Mobile,
        Platform::Server,
    ];

    /// Canonical lowercase name, also used as the output directory name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Server => "server",
        }
    }

    /// Framework the generated code targets.
    #[must_use]
    pub const fn framework(&self) -> &'static str {
        match self {
            Self::Web => "React",
            Self::Desktop => "Electron",
            Self::Mobile => "NativeScript",
            Self::Server => "Node.js",
        }
    }

    /// Human-readable label, e.g. `React (Web)`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let kind = match self {
            Self::Web => "Web",
            Self::Desktop => "Desktop",
            Self::Mobile => "Mobile",
            Self::Server => "Server",
        };
        format!("{} ({kind})", self.framework())
    }

    /// Relative path of the file every successful build must contain.
    #[must_use]
    pub const fn entry_point(&self) -> &'static str {
        match self {
            Self::Web => "src/index.js",
            Self::Desktop => "main.js",
            Self::Mobile => "app.js",
            Self::Server => "server.js",
        }
    }

    /// Words in a free-form request that point at this platform.
    #[must_use]
    pub const fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Web => &["web", "website", "webapp", "browser", "react", "frontend", "spa"],
            Self::Desktop => &[
                "desktop", "electron", "windows", "macos", "linux", "mac",
            ],
            Self::Mobile => &[
                "mobile",
                "ios",
                "android",
                "phone",
                "smartphone",
                "tablet",
                "nativescript",
            ],
            Self::Server => &[
                "server", "backend", "api", "rest", "node", "nodejs", "express",
            ],
        }
    }

    /// Platforms whose keywords appear as whole words in `text`.
    ///
    /// ```rust
    /// use appforge_utils::types::Platform;
    ///
    /// let found = Platform::mentioned_in("A to-do list app for web and mobile");
    /// assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![Platform::Web, Platform::Mobile]);
    /// ```
    #[must_use]
    pub fn mentioned_in(text: &str) -> BTreeSet<Platform> {
        let lowered = text.to_lowercase();
        let words: BTreeSet<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        Self::ALL
            .into_iter()
            .filter(|p| p.keywords().iter().any(|k| words.contains(k)))
            .collect()
    }

    /// Default npm scripts for the generated `package.json`.
    #[must_use]
    pub fn default_scripts(&self) -> BTreeMap<String, String> {
        let pairs: &[(&str, &str)] = match self {
            Self::Web => &[
                ("start", "react-scripts start"),
                ("build", "react-scripts build"),
                ("test", "react-scripts test"),
            ],
            Self::Desktop => &[
                ("start", "electron ."),
                ("build", "electron-builder"),
                ("pack", "electron-builder --dir"),
            ],
            Self::Mobile => &[("android", "ns run android"), ("ios", "ns run ios")],
            Self::Server => &[
                ("start", "node server.js"),
                ("dev", "nodemon server.js"),
                ("test", "jest"),
            ],
        };
        to_map(pairs)
    }

    /// Default runtime dependencies for the generated `package.json`.
    #[must_use]
    pub fn default_dependencies(&self) -> BTreeMap<String, String> {
        let pairs: &[(&str, &str)] = match self {
            Self::Web => &[
                ("react", "^18.2.0"),
                ("react-dom", "^18.2.0"),
                ("react-scripts", "5.0.1"),
            ],
            Self::Desktop => &[("electron-squirrel-startup", "^1.0.0")],
            Self::Mobile => &[
                ("@nativescript/core", "^8.5.3"),
                ("@nativescript/theme", "^3.0.2"),
            ],
            Self::Server => &[
                ("express", "^4.18.2"),
                ("cors", "^2.8.5"),
                ("dotenv", "^16.3.1"),
            ],
        };
        to_map(pairs)
    }

    /// Default development dependencies for the generated `package.json`.
    #[must_use]
    pub fn default_dev_dependencies(&self) -> BTreeMap<String, String> {
        let pairs: &[(&str, &str)] = match self {
            Self::Web => &[
                ("@testing-library/jest-dom", "^5.16.5"),
                ("@testing-library/react", "^13.4.0"),
            ],
            Self::Desktop => &[("electron", "^25.3.1"), ("electron-builder", "^24.4.0")],
            Self::Mobile => &[
                ("@nativescript/android", "^8.5.0"),
                ("@nativescript/ios", "^8.5.0"),
                ("@nativescript/webpack", "^5.0.15"),
            ],
            Self::Server => &[("nodemon", "^2.0.22"), ("jest", "^29.5.0")],
        };
        to_map(pairs)
    }

    /// Markdown snippet explaining how to run the generated project.
    #[must_use]
    pub const fn run_instructions(&self) -> &'static str {
        match self {
            Self::Web => {
                "Run the development server with `npm start`. The app is served at http://localhost:3000."
            }
            Self::Desktop => {
                "Run the application with `npm start`. Build a distributable with `npm run build`."
            }
            Self::Mobile => {
                "Run on Android with `npm run android` or on iOS with `npm run ios` (requires Xcode)."
            }
            Self::Server => {
                "Start the server with `npm start`, or `npm run dev` for auto-reload. The API listens on http://localhost:3000."
            }
        }
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a platform name or alias is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform '{0}' (expected one of: web, desktop, mobile, server)")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    /// Parses canonical names and framework aliases (`react`, `electron`,
    /// `nativescript`, `nodejs`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let normalized = normalized.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        match normalized {
            "web" | "react" | "website" | "frontend" => Ok(Self::Web),
            "desktop" | "electron" => Ok(Self::Desktop),
            "mobile" | "nativescript" | "ios" | "android" => Ok(Self::Mobile),
            "server" | "nodejs" | "node" | "backend" | "api" => Ok(Self::Server),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Cli,
    Config,
    Programmatic,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Config => write!(f, "config"),
            Self::Programmatic => write!(f, "programmatic"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_aliases() {
        assert_eq!("React".parse::<Platform>().unwrap(), Platform::Web);
        assert_eq!("electron".parse::<Platform>().unwrap(), Platform::Desktop);
        assert_eq!(" NativeScript ".parse::<Platform>().unwrap(), Platform::Mobile);
        assert_eq!("nodejs".parse::<Platform>().unwrap(), Platform::Server);
        assert_eq!("\"server\"".parse::<Platform>().unwrap(), Platform::Server);
        assert!("cobol".parse::<Platform>().is_err());
    }

    #[test]
    fn test_mentioned_in_matches_whole_words() {
        let found = Platform::mentioned_in("An Electron desktop client plus a REST API");
        assert!(found.contains(&Platform::Desktop));
        assert!(found.contains(&Platform::Server));
        assert!(!found.contains(&Platform::Web));

        // "capital" contains "api" but is not the word "api"
        assert!(Platform::mentioned_in("capital city trivia").is_empty());
    }

    #[test]
    fn test_platform_serialization() {
        let json = serde_json::to_string(&Platform::Mobile).unwrap();
        assert_eq!(json, r#""mobile""#);
        let back: Platform = serde_json::from_str(r#""desktop""#).unwrap();
        assert_eq!(back, Platform::Desktop);
    }

    #[test]
    fn test_entry_points_are_distinct() {
        let entries: std::collections::BTreeSet<_> =
            Platform::ALL.iter().map(|p| p.entry_point()).collect();
        assert_eq!(entries.len(), Platform::ALL.len());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Platform::Server.display_name(), "Node.js (Server)");
        assert_eq!(Platform::Web.to_string(), "web");
    }

    #[test]
    fn test_every_platform_has_scripts_and_dependencies() {
        for platform in Platform::ALL {
            assert!(!platform.default_scripts().is_empty(), "{platform}");
            assert!(!platform.default_dependencies().is_empty(), "{platform}");
            assert!(!platform.keywords().is_empty(), "{platform}");
        }
    }
}
