//! Classify, cache and alert: the per-message step shared by every account worker.

use crate::cache::ClassificationCache;
use crate::classify::{Category, Classifier};
use crate::mail::{HeaderFields, MessageContent, MessageSummary};
use crate::notify::{Alert, Dispatcher};

/// Whether a (re)classification warrants an alert.
///
/// At most one alert per message while it stays Interested; a change away
/// and back alerts again.
pub fn should_alert(previous: Option<Category>, new: Category) -> bool {
    new == Category::Interested && previous != Some(Category::Interested)
}

pub struct Pipeline {
    classifier: Classifier,
    cache: ClassificationCache,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            classifier: Classifier::new(),
            cache: ClassificationCache::new(),
            dispatcher,
        }
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }

    /// List view: reuse a cached category when present, otherwise classify,
    /// store, and alert on a first-seen Interested message.
    pub async fn resolve_preview(
        &self,
        account_id: &str,
        uid: u32,
        headers: HeaderFields,
        preview: String,
    ) -> MessageSummary {
        let mut summary = MessageSummary {
            account_id: account_id.to_string(),
            uid,
            headers,
            preview,
            classification: Category::Uncategorized,
        };

        // Nothing to classify; left uncached so a later fetch can retry
        if summary.headers.is_empty() || summary.preview.is_empty() {
            tracing::debug!(account = account_id, uid, "Incomplete message data, skipping classification");
            return summary;
        }

        if let Some(cached) = self.cache.get(account_id, uid).await {
            tracing::debug!(account = account_id, uid, category = %cached, "Using cached classification");
            summary.classification = cached;
            return summary;
        }

        let category = self.classifier.classify(&summary);
        self.cache.put(account_id, uid, category).await;
        summary.classification = category;

        if should_alert(None, category) {
            self.dispatcher.dispatch(Alert::from_summary(&summary));
        }

        summary
    }

    /// Full view: always reclassify, overwrite the cache, alert when the
    /// message became Interested.
    pub async fn resolve_full(&self, account_id: &str, content: &MessageContent) -> Category {
        let category = self.classifier.classify(content);
        let previous = self.cache.replace(account_id, content.uid, category).await;

        if should_alert(previous, category) {
            self.dispatcher
                .dispatch(Alert::from_content(account_id, content, category));
        }

        category
    }

    /// Classification only, for reply drafting.
    pub fn classify_full(&self, content: &MessageContent) -> Category {
        self.classifier.classify(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::RecordingNotifier;
    use std::sync::Arc;

    fn headers(subject: &str) -> HeaderFields {
        let mut headers = HeaderFields::new();
        headers.insert("subject".into(), vec![subject.into()]);
        headers
    }

    #[test]
    fn test_should_alert() {
        assert!(should_alert(None, Category::Interested));
        assert!(should_alert(Some(Category::NotInterested), Category::Interested));
        assert!(!should_alert(Some(Category::Interested), Category::Interested));
        assert!(!should_alert(None, Category::Spam));
    }

    #[tokio::test]
    async fn test_preview_alerts_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = Pipeline::new(Dispatcher::new(notifier.clone()));

        for _ in 0..3 {
            let summary = pipeline
                .resolve_preview("acc", 1, headers("Re: proposal"), "tell me more".into())
                .await;
            assert_eq!(summary.classification, Category::Interested);
        }

        notifier.settle().await;
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_preview_is_not_cached() {
        let pipeline = Pipeline::new(Dispatcher::from_webhook(None));
        let summary = pipeline
            .resolve_preview("acc", 1, HeaderFields::new(), "tell me more".into())
            .await;

        assert_eq!(summary.classification, Category::Uncategorized);
        assert_eq!(pipeline.cache().get("acc", 1).await, None);
    }

    #[tokio::test]
    async fn test_full_view_realerts_after_flip() {
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = Pipeline::new(Dispatcher::new(notifier.clone()));
        let mut content = MessageContent {
            uid: 5,
            subject: Some("Re: proposal".into()),
            text: Some("tell me more".into()),
            ..Default::default()
        };

        assert_eq!(pipeline.resolve_full("acc", &content).await, Category::Interested);
        assert_eq!(pipeline.resolve_full("acc", &content).await, Category::Interested);

        content.text = Some("we are not interested".into());
        assert_eq!(pipeline.resolve_full("acc", &content).await, Category::NotInterested);

        content.text = Some("tell me more".into());
        assert_eq!(pipeline.resolve_full("acc", &content).await, Category::Interested);

        notifier.settle().await;
        assert_eq!(notifier.count(), 2);
    }

    #[tokio::test]
    async fn test_classify_full_leaves_cache_alone() {
        let pipeline = Pipeline::new(Dispatcher::from_webhook(None));
        let content = MessageContent {
            uid: 2,
            text: Some("tell me more".into()),
            ..Default::default()
        };
        assert_eq!(pipeline.classify_full(&content), Category::Interested);
        assert_eq!(pipeline.cache().get("acc", 2).await, None);
    }
}
