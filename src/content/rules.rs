use url::Url;

/// Ready selector used when no site rule matches.
pub const GENERIC_READY_SELECTOR: &str = "article";

/// How a site's pages must be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Needs script execution, use the browser when one is configured
    Browser,
    /// Server-rendered, a plain GET is enough
    Fetch,
}

/// Extraction rule for one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRule {
    /// Substring matched against the URL host
    pub host_pattern: String,
    /// CSS selector that appears once the article body has rendered
    pub ready: String,
    /// CSS selector of the main content container
    pub container: String,
    pub mode: RenderMode,
}

impl SiteRule {
    pub fn new(
        host_pattern: impl Into<String>,
        ready: impl Into<String>,
        container: impl Into<String>,
        mode: RenderMode,
    ) -> Self {
        Self {
            host_pattern: host_pattern.into(),
            ready: ready.into(),
            container: container.into(),
            mode,
        }
    }
}

/// Ordered registry of [`SiteRule`]s. The first rule whose pattern occurs in
/// the URL host wins, so more specific patterns go first.
#[derive(Debug, Clone)]
pub struct SiteRules {
    rules: Vec<SiteRule>,
}

impl SiteRules {
    pub fn new(rules: Vec<SiteRule>) -> Self {
        Self { rules }
    }

    /// Registry with no site rules; every URL takes the generic path.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule behind the existing ones.
    pub fn push(&mut self, rule: SiteRule) {
        self.rules.push(rule);
    }

    pub fn lookup(&self, url: &str) -> Option<&SiteRule> {
        let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|rule| host.contains(&rule.host_pattern))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for SiteRules {
    fn default() -> Self {
        use RenderMode::{Browser, Fetch};

        let table = [
            ("any.run", ".entry-content.single-post", "div.entry-content__content.js-content", Browser),
            ("bleepingcomputer.com", ".article_section", "div.articleBody", Fetch),
            ("binarydefense.com", ".TwoColumnLayout", "div.ArticleBase-Body", Browser),
            ("thehackernews.com", ".articlebody.clear.cf", "div.post-content", Fetch),
            ("darkreading.com", ".TwoColumnLayout", "div.ArticleBase-Body", Browser),
            ("krebsonsecurity.com", ".wrapper", "div.content", Fetch),
            ("sophos.com", ".content-area", "div.content-area", Fetch),
            ("truefort.com", ".elementor-widget-container", "div.post-content", Browser),
            ("socprime.com", ".light-theme", "div.sc-block__inner.inner-xs", Browser),
            ("canarytrap.com", ".content-holder", "div.blog-text", Fetch),
            ("socradar.io", ".content-wrapper", "div.content-wrapper", Browser),
            ("nist.gov", ".nist-block", "div.text-with-summary", Fetch),
        ];

        Self::new(
            table
                .into_iter()
                .map(|(host, ready, container, mode)| SiteRule::new(host, ready, container, mode))
                .collect(),
        )
    }
}
