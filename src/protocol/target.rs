//! `Target` domain: target discovery, creation, attachment and closure.
//!
//! Only the methods and events the session manager depends on are bound
//! here; they follow the same [`Command`]/[`Event`] contract as any other
//! domain binding.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::{BrowserContextId, SessionId, TargetId};

use super::command::{Command, Empty};
use super::event::Event;

// ============================================================================
// Types
// ============================================================================

/// Description of a target as reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target identifier.
    pub target_id: TargetId,
    /// Target type (`page`, `iframe`, `service_worker`, ...).
    #[serde(rename = "type")]
    pub target_type: String,
    /// Current title.
    #[serde(default)]
    pub title: String,
    /// Current URL.
    #[serde(default)]
    pub url: String,
    /// Whether some client is attached.
    #[serde(default)]
    pub attached: bool,
    /// Target that opened this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener_id: Option<TargetId>,
    /// Browser context the target lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_context_id: Option<BrowserContextId>,
}

impl TargetInfo {
    /// Returns `true` for top-level pages.
    #[inline]
    #[must_use]
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

// ============================================================================
// Commands
// ============================================================================

/// `Target.createTarget`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTarget {
    /// Initial URL.
    pub url: String,
    /// Frame width in DIP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Frame height in DIP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Browser context to create the target in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_context_id: Option<BrowserContextId>,
    /// Open in a new window instead of a tab.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_window: Option<bool>,
    /// Create the target in background.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
}

impl CreateTarget {
    /// Creates a command for `url` with browser defaults for everything else.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
            browser_context_id: None,
            new_window: None,
            background: None,
        }
    }
}

/// Result of [`CreateTarget`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResponse {
    /// The created target.
    pub target_id: TargetId,
}

impl Command for CreateTarget {
    const METHOD: &'static str = "Target.createTarget";
    type Response = CreateTargetResponse;
}

/// `Target.attachToTarget`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTarget {
    /// Target to attach to.
    pub target_id: TargetId,
    /// Use flat session-id addressing instead of nested messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flatten: Option<bool>,
}

/// Result of [`AttachToTarget`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResponse {
    /// The new session.
    pub session_id: SessionId,
}

impl Command for AttachToTarget {
    const METHOD: &'static str = "Target.attachToTarget";
    type Response = AttachToTargetResponse;
}

/// `Target.detachFromTarget`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachFromTarget {
    /// Session to detach.
    pub session_id: SessionId,
}

impl Command for DetachFromTarget {
    const METHOD: &'static str = "Target.detachFromTarget";
    type Response = Empty;
}

/// `Target.closeTarget`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTarget {
    /// Target to close.
    pub target_id: TargetId,
}

/// Result of [`CloseTarget`].
#[derive(Debug, Clone, Deserialize)]
pub struct CloseTargetResponse {
    /// Always `true` on current browsers; absent on some.
    #[serde(default)]
    pub success: Option<bool>,
}

impl Command for CloseTarget {
    const METHOD: &'static str = "Target.closeTarget";
    type Response = CloseTargetResponse;
}

/// `Target.getTargets`
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetTargets {}

/// Result of [`GetTargets`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetsResponse {
    /// All known targets.
    pub target_infos: Vec<TargetInfo>,
}

impl Command for GetTargets {
    const METHOD: &'static str = "Target.getTargets";
    type Response = GetTargetsResponse;
}

/// `Target.getTargetInfo`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetInfo {
    /// Target to describe.
    pub target_id: TargetId,
}

/// Result of [`GetTargetInfo`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetInfoResponse {
    /// Current description.
    pub target_info: TargetInfo,
}

impl Command for GetTargetInfo {
    const METHOD: &'static str = "Target.getTargetInfo";
    type Response = GetTargetInfoResponse;
}

/// `Target.createBrowserContext`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrowserContext {
    /// Dispose the context when the creating client detaches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispose_on_detach: Option<bool>,
}

/// Result of [`CreateBrowserContext`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrowserContextResponse {
    /// The created context.
    pub browser_context_id: BrowserContextId,
}

impl Command for CreateBrowserContext {
    const METHOD: &'static str = "Target.createBrowserContext";
    type Response = CreateBrowserContextResponse;
}

/// `Target.disposeBrowserContext`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisposeBrowserContext {
    /// Context to dispose, closing all its targets.
    pub browser_context_id: BrowserContextId,
}

impl Command for DisposeBrowserContext {
    const METHOD: &'static str = "Target.disposeBrowserContext";
    type Response = Empty;
}

/// `Target.setDiscoverTargets`
#[derive(Debug, Clone, Serialize)]
pub struct SetDiscoverTargets {
    /// Emit `targetCreated`/`targetDestroyed`/`targetInfoChanged`.
    pub discover: bool,
}

impl Command for SetDiscoverTargets {
    const METHOD: &'static str = "Target.setDiscoverTargets";
    type Response = Empty;
}

// ============================================================================
// Events
// ============================================================================

/// `Target.targetCreated`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCreated {
    /// The new target.
    pub target_info: TargetInfo,
}

impl Event for TargetCreated {
    const METHOD: &'static str = "Target.targetCreated";
}

/// `Target.targetDestroyed`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDestroyed {
    /// The destroyed target.
    pub target_id: TargetId,
}

impl Event for TargetDestroyed {
    const METHOD: &'static str = "Target.targetDestroyed";
}

/// `Target.targetCrashed`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCrashed {
    /// The crashed target.
    pub target_id: TargetId,
    /// Termination status.
    #[serde(default)]
    pub status: String,
    /// Termination error code.
    #[serde(default)]
    pub error_code: i64,
}

impl Event for TargetCrashed {
    const METHOD: &'static str = "Target.targetCrashed";
}

/// `Target.targetInfoChanged`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfoChanged {
    /// Updated description.
    pub target_info: TargetInfo,
}

impl Event for TargetInfoChanged {
    const METHOD: &'static str = "Target.targetInfoChanged";
}

/// `Target.attachedToTarget`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedToTarget {
    /// The new session.
    pub session_id: SessionId,
    /// The attached target.
    pub target_info: TargetInfo,
    /// Whether the target waits for `Runtime.runIfWaitingForDebugger`.
    #[serde(default)]
    pub waiting_for_debugger: bool,
}

impl Event for AttachedToTarget {
    const METHOD: &'static str = "Target.attachedToTarget";
}

/// `Target.detachedFromTarget`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedFromTarget {
    /// The detached session.
    pub session_id: SessionId,
    /// The target it was attached to.
    #[serde(default)]
    pub target_id: Option<TargetId>,
}

impl Event for DetachedFromTarget {
    const METHOD: &'static str = "Target.detachedFromTarget";
}

// ============================================================================
// Tests
// ============================================================================
