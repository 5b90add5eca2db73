use std::sync::Arc;

use async_trait::async_trait;
use domain::{HttpRequestRecord, Page, PageRequest, Timestamp, UserActivityLog, UserId};

use crate::{
    activity_queue::ActivityLogSink,
    clock::Clock,
    error::ApplicationError,
    repository::{ActivityLogFilter, ActivityLogRepository},
};

/// 单次查询某个用户日志的默认条数
pub const DEFAULT_USER_LOG_LIMIT: u32 = 50;

#[derive(Debug, Clone, Default)]
pub struct ActivityLogQuery {
    pub filter: ActivityLogFilter,
    pub page: PageRequest,
}

pub struct ActivityLogServiceDependencies {
    pub activity_log_repository: Arc<dyn ActivityLogRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ActivityLogService {
    deps: ActivityLogServiceDependencies,
}

impl ActivityLogService {
    pub fn new(deps: ActivityLogServiceDependencies) -> Self {
        Self { deps }
    }

    /// 记录一次 HTTP 请求，操作类型和描述由路径推导
    pub async fn log_http_request(
        &self,
        record: HttpRequestRecord,
    ) -> Result<(), ApplicationError> {
        let log = UserActivityLog::from_request(record);
        tracing::debug!(action = %log.action, path = %log.path, status = log.status_code, "persisting activity log");
        self.deps.activity_log_repository.insert(log).await?;
        Ok(())
    }

    pub async fn query(
        &self,
        query: ActivityLogQuery,
    ) -> Result<Page<UserActivityLog>, ApplicationError> {
        if let (Some(start), Some(end)) = (query.filter.start, query.filter.end) {
            if start > end {
                return Err(ApplicationError::invalid_argument(
                    "startDate must not be later than endDate",
                ));
            }
        }
        Ok(self
            .deps
            .activity_log_repository
            .query(&query.filter, query.page)
            .await?)
    }

    pub async fn user_logs(
        &self,
        user_id: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<UserActivityLog>, ApplicationError> {
        let limit = limit.unwrap_or(DEFAULT_USER_LOG_LIMIT).clamp(1, 500);
        Ok(self
            .deps
            .activity_log_repository
            .list_by_user(user_id, limit)
            .await?)
    }

    /// 软删除早于指定时间的日志
    pub async fn purge_older_than(&self, before: Timestamp) -> Result<u64, ApplicationError> {
        if before > self.deps.clock.now() {
            return Err(ApplicationError::invalid_argument(
                "cutoff must not be in the future",
            ));
        }
        let removed = self
            .deps
            .activity_log_repository
            .soft_delete_older_than(before)
            .await?;
        tracing::info!(removed, before = %before, "old activity logs purged");
        Ok(removed)
    }
}

#[async_trait]
impl ActivityLogSink for ActivityLogService {
    async fn persist(&self, record: &HttpRequestRecord) -> Result<(), ApplicationError> {
        self.log_http_request(record.clone()).await
    }
}
