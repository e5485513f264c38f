mod click;
mod link;
mod tenant;

pub use click::{ClickEvent, RequestContext, UtmParams};
pub use link::{
    CachedLinkSnapshot, DeviceClass, Link, LinkStatus, NewLink, ParseFieldError, RedirectKind,
    RoutingRules,
};
pub use tenant::{TenantId, TenantRecord};
