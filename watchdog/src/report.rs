//! Report rendering.
//!
//! The report is a markdown message for the chat webhook. Rendering is a
//! pure function of the readiness flags, the error lines and the locale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Readiness of each part of the delivery chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessFlags {
    /// Login works.
    pub login: bool,
    /// A commit triggers a build.
    pub commit_trigger: bool,
    /// The build succeeds and publishes an artifact.
    pub build: bool,
    /// A new artifact triggers a deployment.
    pub auto_deploy: bool,
    /// The deployment succeeds.
    pub deploy: bool,
}

impl ReadinessFlags {
    /// Returns true when every flag is set.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.login && self.commit_trigger && self.build && self.auto_deploy && self.deploy
    }
}

/// Language of the rendered report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLocale {
    /// Simplified Chinese.
    #[default]
    Zh,
    /// English.
    En,
}

impl fmt::Display for ReportLocale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zh => write!(f, "zh"),
            Self::En => write!(f, "en"),
        }
    }
}

impl FromStr for ReportLocale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" => Ok(Self::Zh),
            "en" | "en-us" | "en_us" => Ok(Self::En),
            other => Err(format!("unknown report locale: {other}")),
        }
    }
}

struct Labels {
    title: &'static str,
    login: &'static str,
    build: &'static str,
    commit: &'static str,
    auto_deploy: &'static str,
    deploy: &'static str,
    separator: &'static str,
    normal: &'static str,
    abnormal: &'static str,
}

const ZH: Labels = Labels {
    title: "执行 DX 环境定期自检：",
    login: "登录",
    build: "构建",
    commit: "代码触发",
    auto_deploy: "自动触发",
    deploy: "部署",
    separator: "：",
    normal: "正常",
    abnormal: "异常",
};

const EN: Labels = Labels {
    title: "DX environment scheduled self-check:",
    login: "Login",
    build: "Build",
    commit: "Commit trigger",
    auto_deploy: "Auto trigger",
    deploy: "Deploy",
    separator: ": ",
    normal: "normal",
    abnormal: "abnormal",
};

impl ReportLocale {
    fn labels(self) -> &'static Labels {
        match self {
            Self::Zh => &ZH,
            Self::En => &EN,
        }
    }
}

/// Renders one flag as a highlighted marker.
#[must_use]
pub fn status_marker(ready: bool, locale: ReportLocale) -> String {
    let labels = locale.labels();
    if ready {
        format!("<font color=\"info\">{}</font>", labels.normal)
    } else {
        format!("<font color=\"warning\">{}</font>", labels.abnormal)
    }
}

/// Renders the report.
///
/// The layout is fixed: a leading blank line, the title, one line per flag
/// (login, build, commit trigger, auto trigger, deploy), then `error_text`
/// verbatim followed by a newline.
#[must_use]
pub fn render(flags: &ReadinessFlags, error_text: &str, locale: ReportLocale) -> String {
    let l = locale.labels();
    let line = |label: &str, ready: bool| {
        format!("- {label}{}{}\n", l.separator, status_marker(ready, locale))
    };

    let mut out = String::new();
    out.push('\n');
    out.push_str(l.title);
    out.push('\n');
    out.push_str(&line(l.login, flags.login));
    out.push_str(&line(l.build, flags.build));
    out.push_str(&line(l.commit, flags.commit_trigger));
    out.push_str(&line(l.auto_deploy, flags.auto_deploy));
    out.push_str(&line(l.deploy, flags.deploy));
    out.push_str(error_text);
    out.push('\n');
    out
}

/// A finished check, ready to be rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Readiness flags.
    pub flags: ReadinessFlags,
    /// Error lines in the order they were recorded.
    pub errors: Vec<String>,
}

impl Report {
    /// Creates a report.
    #[must_use]
    pub fn new(flags: ReadinessFlags, errors: Vec<String>) -> Self {
        Self { flags, errors }
    }

    /// Error lines joined with newlines.
    #[must_use]
    pub fn error_text(&self) -> String {
        self.errors.join("\n")
    }

    /// Renders the report in `locale`.
    #[must_use]
    pub fn render(&self, locale: ReportLocale) -> String {
        render(&self.flags, &self.error_text(), locale)
    }
}
