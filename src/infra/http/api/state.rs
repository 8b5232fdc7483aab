use std::sync::Arc;

use crate::application::analytics::AnalyticsService;
use crate::application::auth::AuthService;
use crate::application::blogs::BlogService;
use crate::application::cdn::CdnService;
use crate::application::repos::HealthRepo;

#[derive(Clone)]
pub struct ApiState {
    pub blogs: Arc<BlogService>,
    pub auth: Arc<AuthService>,
    pub analytics: Arc<AnalyticsService>,
    pub cdn: Arc<CdnService>,
    pub health: Arc<dyn HealthRepo>,
}
