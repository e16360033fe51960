//! In-memory browser used by the tests.
//!
//! Renders a scripted Al Jazeera style results page: a result list that grows
//! one batch per "Show more" click, an optional loading spinner, and an
//! optional section filter that only [`FilteredSite`] looks for. Every node
//! remembers the tab it was found in; reading it while another tab is
//! focused fails the way a real driver does.

use super::{BrowserBackend, PageHandle};
use crate::errors::BrowserError;
use crate::locator::ArticleLocator;
use crate::sites::NewsSite;
use crate::sites::aljazeera::Aljazeera;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

/// The Al Jazeera layout plus a section filter, for exercising section
/// selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilteredSite;

impl ArticleLocator for FilteredSite {
    const DATE: &'static str = Aljazeera::DATE;
    const TITLE: &'static str = Aljazeera::TITLE;
    const LINK: &'static str = Aljazeera::LINK;
    const DESCRIPTION: &'static str = Aljazeera::DESCRIPTION;
    const PICTURE: &'static str = Aljazeera::PICTURE;

    fn clean_description(text: &str) -> String {
        Aljazeera::clean_description(text)
    }
}

impl NewsSite for FilteredSite {
    const NAME: &'static str = "filtered";
    const BASE_URL: &'static str = Aljazeera::BASE_URL;
    const RESULT_LIST: &'static str = Aljazeera::RESULT_LIST;
    const CONTENT_NODE: &'static str = Aljazeera::CONTENT_NODE;
    const NEXT_PAGE: &'static str = Aljazeera::NEXT_PAGE;
    const LOADING: &'static str = Aljazeera::LOADING;
    const SECTION_CONTROL: Option<&'static str> = Some("//div[@class='section-filter']");
    const SECTION_OPTION: &'static str = ".//button";

    fn search_url(phrase: &str) -> String {
        Aljazeera::search_url(phrase)
    }
}

#[derive(Debug, Clone)]
pub struct FakeArticle {
    id: String,
    date_text: String,
    description: String,
    has_title: bool,
    has_picture: bool,
    stale: bool,
}

impl FakeArticle {
    pub fn dated(id: &str, date_text: &str) -> Self {
        Self {
            id: id.to_string(),
            date_text: date_text.to_string(),
            description: format!("desc {id}"),
            has_title: true,
            has_picture: true,
            stale: false,
        }
    }

    pub fn stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn without_title(mut self) -> Self {
        self.has_title = false;
        self
    }

    pub fn without_picture(mut self) -> Self {
        self.has_picture = false;
        self
    }

    pub fn with_description(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    fn title(&self) -> String {
        format!("Title {}", self.id)
    }

    fn link(&self) -> String {
        format!("{}/news/{}", Aljazeera::BASE_URL, self.id)
    }

    fn picture(&self) -> String {
        format!("https://img.example/{}.jpg", self.id)
    }
}

/// Scripted content of every search results page.
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    batches: Option<Vec<Vec<FakeArticle>>>,
    loading_polls: usize,
    sections: Vec<String>,
}

impl FakeSite {
    /// A results page that reveals one more batch per load-more click.
    pub fn with_batches(batches: Vec<Vec<FakeArticle>>) -> Self {
        Self {
            batches: Some(batches),
            ..Self::default()
        }
    }

    /// Keep the spinner up for `polls` lookups after each load-more click.
    /// `usize::MAX` never clears.
    pub fn loading_for(mut self, polls: usize) -> Self {
        self.loading_polls = polls;
        self
    }

    pub fn with_sections(mut self, labels: &[&str]) -> Self {
        self.sections = labels.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    ResultList,
    Article(usize),
    Date(usize),
    Title(usize),
    Link(usize),
    Description(usize),
    Picture(usize),
    NextButton,
    Spinner,
    SectionControl,
    SectionOption(usize),
}

#[derive(Debug, Clone)]
pub struct FakeNode {
    tab: PageHandle,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct FakeState {
    site: FakeSite,
    windows: Vec<(PageHandle, String)>,
    current: Option<PageHandle>,
    next_window: usize,
    revealed: usize,
    loading_left: usize,
    fail_navigation: bool,
    pub cookies: Vec<(String, String)>,
    pub refreshes: usize,
    pub switches: usize,
    pub quits: usize,
    pub next_lookups: usize,
    pub clicks: usize,
    pub loading_polls: usize,
    pub visited: Vec<String>,
    pub selected_section: Option<String>,
}

impl FakeState {
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    fn focused(&self) -> Result<&PageHandle, BrowserError> {
        self.current
            .as_ref()
            .ok_or_else(|| BrowserError::NoSuchWindow("no focused window".to_string()))
    }

    fn focused_url(&self) -> Result<&str, BrowserError> {
        let current = self.focused()?;
        self.windows
            .iter()
            .find(|(h, _)| h == current)
            .map(|(_, url)| url.as_str())
            .ok_or_else(|| BrowserError::NoSuchWindow(current.to_string()))
    }

    /// Articles currently rendered, in document order.
    fn rendered(&self) -> Vec<&FakeArticle> {
        self.site
            .batches
            .iter()
            .flatten()
            .take(self.revealed)
            .flatten()
            .collect()
    }

    fn article(&self, index: usize) -> Result<&FakeArticle, BrowserError> {
        let article = self
            .rendered()
            .get(index)
            .copied()
            .ok_or_else(|| BrowserError::StaleNode(format!("article {index} is gone")))?;
        if article.stale {
            return Err(BrowserError::StaleNode(format!(
                "article {} detached from the DOM",
                article.id
            )));
        }
        Ok(article)
    }

    fn check_live(&self, node: &FakeNode) -> Result<(), BrowserError> {
        if self.current.as_ref() != Some(&node.tab) {
            return Err(BrowserError::StaleNode(format!(
                "node belongs to {}, focused window is {:?}",
                node.tab, self.current
            )));
        }
        Ok(())
    }

    fn node(&self, kind: NodeKind) -> Result<FakeNode, BrowserError> {
        Ok(FakeNode {
            tab: self.focused()?.clone(),
            kind,
        })
    }

    fn find_in_document(&mut self, xpath: &str) -> Result<Vec<FakeNode>, BrowserError> {
        let url = self.focused_url()?.to_string();
        let Some(batches) = self.site.batches.as_ref().filter(|_| url.contains("/search/")) else {
            return Ok(Vec::new());
        };
        let total_batches = batches.len();

        let kind = if xpath == Aljazeera::RESULT_LIST {
            Some(NodeKind::ResultList)
        } else if xpath == Aljazeera::NEXT_PAGE {
            self.next_lookups += 1;
            (self.revealed < total_batches).then_some(NodeKind::NextButton)
        } else if xpath == Aljazeera::LOADING {
            self.loading_polls += 1;
            if self.loading_left == 0 {
                None
            } else {
                if self.loading_left != usize::MAX {
                    self.loading_left -= 1;
                }
                Some(NodeKind::Spinner)
            }
        } else if Some(xpath) == FilteredSite::SECTION_CONTROL {
            (!self.site.sections.is_empty()).then_some(NodeKind::SectionControl)
        } else {
            None
        };
        kind.map(|k| self.node(k)).into_iter().collect()
    }

    fn find_within(&self, scope: &FakeNode, xpath: &str) -> Result<Vec<FakeNode>, BrowserError> {
        self.check_live(scope)?;
        let kinds: Vec<NodeKind> = match scope.kind {
            NodeKind::ResultList if xpath == Aljazeera::CONTENT_NODE => {
                (0..self.rendered().len()).map(NodeKind::Article).collect()
            }
            NodeKind::Article(i) => {
                let article = self.article(i)?;
                if xpath == Aljazeera::DATE {
                    vec![NodeKind::Date(i)]
                } else if xpath == Aljazeera::TITLE && article.has_title {
                    vec![NodeKind::Title(i)]
                } else if xpath == Aljazeera::DESCRIPTION {
                    vec![NodeKind::Description(i)]
                } else if xpath == Aljazeera::PICTURE && article.has_picture {
                    vec![NodeKind::Picture(i)]
                } else {
                    Vec::new()
                }
            }
            NodeKind::Title(i) if xpath == Aljazeera::LINK => vec![NodeKind::Link(i)],
            NodeKind::SectionControl if xpath == FilteredSite::SECTION_OPTION => {
                (0..self.site.sections.len()).map(NodeKind::SectionOption).collect()
            }
            _ => Vec::new(),
        };
        kinds.into_iter().map(|k| self.node(k)).collect()
    }

    fn text(&self, node: &FakeNode) -> Result<String, BrowserError> {
        self.check_live(node)?;
        Ok(match node.kind {
            NodeKind::Date(i) => self.article(i)?.date_text.clone(),
            NodeKind::Title(i) | NodeKind::Link(i) => self.article(i)?.title(),
            NodeKind::Description(i) => self.article(i)?.description.clone(),
            NodeKind::SectionOption(i) => self.site.sections[i].clone(),
            NodeKind::NextButton => "Show more".to_string(),
            _ => String::new(),
        })
    }

    fn attr(&self, node: &FakeNode, name: &str) -> Result<Option<String>, BrowserError> {
        self.check_live(node)?;
        Ok(match (node.kind, name) {
            (NodeKind::Link(i), "href") => Some(self.article(i)?.link()),
            (NodeKind::Picture(i), "src") => Some(self.article(i)?.picture()),
            _ => None,
        })
    }

    fn click(&mut self, node: &FakeNode) -> Result<(), BrowserError> {
        self.check_live(node)?;
        self.clicks += 1;
        match node.kind {
            NodeKind::NextButton => {
                self.revealed += 1;
                self.loading_left = self.site.loading_polls;
            }
            NodeKind::SectionOption(i) => {
                self.selected_section = Some(self.site.sections[i].clone());
            }
            _ => {}
        }
        Ok(())
    }
}

/// Cloneable handle to one shared fake browser; clones observe the same state.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new(site: FakeSite) -> Self {
        let initial = PageHandle::new("window-0");
        Self {
            state: Arc::new(Mutex::new(FakeState {
                site,
                windows: vec![(initial.clone(), "about:blank".to_string())],
                current: Some(initial),
                next_window: 1,
                revealed: 1,
                loading_left: 0,
                fail_navigation: false,
                cookies: Vec::new(),
                refreshes: 0,
                switches: 0,
                quits: 0,
                next_lookups: 0,
                clicks: 0,
                loading_polls: 0,
                visited: Vec::new(),
                selected_section: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake browser state poisoned")
    }

    pub fn snapshot(&self) -> FakeState {
        self.lock().clone()
    }

    /// The window the fake browser has focused.
    pub fn current(&self) -> Option<PageHandle> {
        self.lock().current.clone()
    }

    pub fn url_of(&self, handle: &PageHandle) -> Option<String> {
        self.lock()
            .windows
            .iter()
            .find(|(h, _)| h == handle)
            .map(|(_, url)| url.clone())
    }

    /// Make every subsequent navigation fail.
    pub fn fail_navigation(&self) {
        self.lock().fail_navigation = true;
    }
}

impl BrowserBackend for FakeBackend {
    type Node = FakeNode;

    async fn current_handle(&self) -> Result<PageHandle, BrowserError> {
        self.lock().focused().cloned()
    }

    async fn handles(&self) -> Result<Vec<PageHandle>, BrowserError> {
        Ok(self.lock().windows.iter().map(|(h, _)| h.clone()).collect())
    }

    async fn open_tab(&self) -> Result<PageHandle, BrowserError> {
        let mut state = self.lock();
        let handle = PageHandle::new(format!("window-{}", state.next_window));
        state.next_window += 1;
        state.windows.push((handle.clone(), "about:blank".to_string()));
        Ok(handle)
    }

    async fn switch_to(&self, handle: &PageHandle) -> Result<(), BrowserError> {
        let mut state = self.lock();
        if !state.windows.iter().any(|(h, _)| h == handle) {
            return Err(BrowserError::NoSuchWindow(handle.to_string()));
        }
        state.current = Some(handle.clone());
        state.switches += 1;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        if state.fail_navigation {
            return Err(BrowserError::Driver(format!("navigation to {url} refused")));
        }
        let current = state.focused()?.clone();
        if let Some((_, location)) = state.windows.iter_mut().find(|(h, _)| *h == current) {
            *location = url.to_string();
        }
        state.visited.push(url.to_string());
        Ok(())
    }

    async fn refresh(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.focused()?;
        state.refreshes += 1;
        Ok(())
    }

    async fn add_cookie(&self, name: &str, value: &str) -> Result<(), BrowserError> {
        self.lock().cookies.push((name.to_string(), value.to_string()));
        Ok(())
    }

    async fn close_current(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        let current = state.focused()?.clone();
        state.windows.retain(|(h, _)| *h != current);
        state.current = None;
        Ok(())
    }

    async fn find_all(
        &self,
        scope: Option<&FakeNode>,
        xpath: &str,
    ) -> Result<Vec<FakeNode>, BrowserError> {
        let mut state = self.lock();
        match scope {
            Some(node) => state.find_within(node, xpath),
            None => state.find_in_document(xpath),
        }
    }

    async fn text(&self, node: &FakeNode) -> Result<String, BrowserError> {
        self.lock().text(node)
    }

    async fn attr(&self, node: &FakeNode, name: &str) -> Result<Option<String>, BrowserError> {
        self.lock().attr(node, name)
    }

    async fn click(&self, node: &FakeNode) -> Result<(), BrowserError> {
        self.lock().click(node)
    }

    fn quit(self) -> impl Future<Output = Result<(), BrowserError>> + Send {
        async move {
            let mut state = self.lock();
            state.quits += 1;
            state.windows.clear();
            state.current = None;
            Ok(())
        }
    }
}
