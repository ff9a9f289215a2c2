use crate::backend::{LogFeed, LogTarget, StatusBackend};
use crate::model::{Controller, ControllerPayload, LogLine, PodSummary, ReleaseKind, ReleaseRef};
use anyhow::{Context, Result};
use futures::{AsyncBufReadExt, StreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const FEED_CHANNEL_CAPACITY: usize = 1_024;

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub release_label: String,
    pub log_tail_lines: i64,
    pub timestamps: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            release_label: "app.kubernetes.io/instance".to_string(),
            log_tail_lines: 500,
            timestamps: true,
        }
    }
}

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
    default_namespace: String,
    options: GatewayOptions,
}

impl KubeGateway {
    pub async fn new(context: Option<String>, options: GatewayOptions) -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            let kube_options = KubeConfigOptions {
                context: context.clone(),
                cluster: None,
                user: None,
            };
            Config::from_custom_kubeconfig(kubeconfig_value, &kube_options)
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            if context.is_some() {
                anyhow::bail!("kubeconfig not found; --cluster is unavailable in this environment");
            }
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let cluster_url = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;

        let active_context = context
            .or_else(|| {
                kubeconfig
                    .as_ref()
                    .and_then(|cfg| cfg.current_context.clone())
            })
            .unwrap_or_else(|| "in-cluster".to_string());

        Ok(Self {
            client,
            context: active_context,
            cluster: cluster_url,
            default_namespace,
            options,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    fn ensure_cluster(&self, cluster_id: &str) -> Result<()> {
        if cluster_id == self.context || cluster_id == self.cluster {
            return Ok(());
        }
        anyhow::bail!(
            "cluster '{cluster_id}' is not the active context '{}'",
            self.context
        )
    }

    fn release_params(&self, release: &ReleaseRef) -> ListParams {
        list_params().labels(&format!("{}={}", self.options.release_label, release.name))
    }

    async fn standard_controllers(&self, release: &ReleaseRef) -> Result<Vec<Value>> {
        let params = self.release_params(release);
        let namespace = release.namespace.as_str();

        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let daemonsets: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);

        let mut items = Vec::new();
        items.extend(
            to_values(by_age(deployments.list(&params).await?.items))
                .context("failed to encode deployments")?,
        );
        items.extend(
            to_values(by_age(statefulsets.list(&params).await?.items))
                .context("failed to encode statefulsets")?,
        );
        items.extend(
            to_values(by_age(daemonsets.list(&params).await?.items))
                .context("failed to encode daemonsets")?,
        );
        items.extend(
            to_values(by_age(jobs.list(&params).await?.items)).context("failed to encode jobs")?,
        );
        Ok(items)
    }

    async fn job_definitions(&self, release: &ReleaseRef) -> Result<Vec<Value>> {
        let params = self.release_params(release);
        let cronjobs: Api<CronJob> = Api::namespaced(self.client.clone(), &release.namespace);
        let mut list = by_age(cronjobs.list(&params).await?.items);
        // newest definition first
        list.reverse();
        to_values(list).context("failed to encode cronjobs")
    }
}

#[async_trait::async_trait]
impl StatusBackend for KubeGateway {
    async fn fetch_controllers(&self, release: &ReleaseRef) -> Result<ControllerPayload> {
        self.ensure_cluster(&release.cluster_id)?;
        debug!(release = %release, project = %release.project_id, "fetching controllers");
        let items = match release.kind {
            ReleaseKind::Standard => self.standard_controllers(release).await,
            ReleaseKind::Job => self.job_definitions(release).await,
        }
        .with_context(|| format!("failed to load controllers for {release}"))?;
        Ok(ControllerPayload::for_kind(release.kind, items))
    }

    async fn fetch_pods(
        &self,
        cluster_id: &str,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<PodSummary>> {
        self.ensure_cluster(cluster_id)?;
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&list_params().labels(selector))
            .await
            .with_context(|| format!("failed to list pods for {selector}"))?;

        Ok(by_age(list.items).iter().map(pod_summary).collect())
    }

    async fn open_log_feed(&self, target: &LogTarget) -> Result<LogFeed> {
        self.ensure_cluster(&target.cluster_id)?;
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let params = LogParams {
            container: target.container.clone(),
            follow: true,
            tail_lines: Some(self.options.log_tail_lines),
            timestamps: self.options.timestamps,
            ..LogParams::default()
        };
        let timestamps = self.options.timestamps;
        let pod_name = target.pod_name.clone();
        let (opened_tx, opened_rx) = oneshot::channel::<Result<()>>();
        let (tx, rx) = mpsc::channel::<Result<LogLine>>(FEED_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let reader = match pods.log_stream(&pod_name, &params).await {
                Ok(reader) => reader,
                Err(error) => {
                    let _ = opened_tx.send(Err(anyhow::Error::new(error)
                        .context(format!("failed to open logs for {pod_name}"))));
                    return;
                }
            };
            let _ = opened_tx.send(Ok(()));

            let mut lines = std::pin::pin!(reader.lines());
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = lines.next() => {
                        let item = match next {
                            Some(Ok(raw)) if timestamps => Ok(LogLine::parse_timestamped(&raw)),
                            Some(Ok(raw)) => Ok(LogLine::new(raw)),
                            Some(Err(error)) => Err(anyhow::Error::new(error)
                                .context(format!("log stream for {pod_name} broke"))),
                            None => break,
                        };
                        let failed = item.is_err();
                        if tx.send(item).await.is_err() || failed {
                            break;
                        }
                    }
                }
            }
            debug!(pod = %pod_name, "log stream closed");
        });

        opened_rx
            .await
            .context("log stream task exited before opening")??;

        let feed = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(feed.boxed())
    }
}

/// Derives one pod selector per controller from its raw resource, in
/// controller order.
pub fn resolve_selectors(controllers: &[Controller]) -> Vec<String> {
    controllers
        .iter()
        .map(|controller| selector_for(&controller.raw_status, &controller.kind, &controller.name))
        .collect()
}

fn selector_for(raw: &Value, kind: &str, name: &str) -> String {
    if let Some(labels) = raw
        .pointer("/spec/selector/matchLabels")
        .and_then(Value::as_object)
        && !labels.is_empty()
    {
        let labels = labels
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|value| (key.clone(), value.to_string())))
            .collect::<BTreeMap<_, _>>();
        return selector_query(&labels);
    }

    let is_job = kind.eq_ignore_ascii_case("Job");
    if is_job
        && let Some(uid) = raw.pointer("/metadata/uid").and_then(Value::as_str)
        && !uid.is_empty()
    {
        return format!("controller-uid={uid}");
    }

    if is_job && name != "-" {
        return format!("job-name={name}");
    }

    warn!(kind, name, "no pod selector could be derived");
    String::new()
}

fn pod_summary(pod: &Pod) -> PodSummary {
    let mut container_names = Vec::new();
    if let Some(spec) = pod.spec.as_ref() {
        container_names.extend(spec.containers.iter().map(|container| container.name.clone()));
        container_names.extend(
            spec.init_containers
                .as_ref()
                .into_iter()
                .flatten()
                .map(|container| container.name.clone()),
        );
    }

    PodSummary {
        uid: pod.uid().unwrap_or_else(|| pod.name_any()),
        name: pod.name_any(),
        phase: pod
            .status
            .as_ref()
            .and_then(|status| status.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        container_names,
    }
}

fn by_age<K>(mut items: Vec<K>) -> Vec<K>
where
    K: kube::Resource,
{
    items.sort_by(|left, right| {
        created_seconds(left.meta().creation_timestamp.as_ref())
            .cmp(&created_seconds(right.meta().creation_timestamp.as_ref()))
            .then_with(|| left.meta().name.cmp(&right.meta().name))
    });
    items
}

fn created_seconds(timestamp: Option<&Time>) -> i64 {
    timestamp.map(|time| time.0.as_second()).unwrap_or(0)
}

fn to_values<T>(items: Vec<T>) -> Result<Vec<Value>>
where
    T: Serialize,
{
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(anyhow::Error::from))
        .collect()
}

fn list_params() -> ListParams {
    ListParams::default().limit(500)
}

fn selector_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::{pod_summary, resolve_selectors};
    use crate::model::ControllerPayload;
    use crate::normalize::normalize_controllers;
    use k8s_openapi::api::core::v1::Pod;
    use serde_json::json;

    #[test]
    fn selectors_follow_controller_order() {
        let controllers = normalize_controllers(ControllerPayload::Standard(vec![
            json!({
                "kind": "Deployment",
                "metadata": {"name": "web", "uid": "d1"},
                "spec": {"selector": {"matchLabels": {"tier": "web", "app": "shop"}}}
            }),
            json!({"kind": "Job", "name": "nightly-2891", "uid": "j1"}),
            json!({"kind": "ConfigMap", "metadata": {"name": "settings", "uid": "c1"}}),
            json!({"kind": "Job", "metadata": {"name": "migrate", "uid": "j2"}}),
        ]));

        assert_eq!(
            resolve_selectors(&controllers),
            vec![
                "app=shop,tier=web".to_string(),
                "job-name=nightly-2891".to_string(),
                String::new(),
                "controller-uid=j2".to_string(),
            ]
        );
    }

    #[test]
    fn pod_summary_lists_containers_and_phase() {
        let pod: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web-7d9c", "uid": "p-1"},
            "spec": {
                "containers": [{"name": "app"}, {"name": "proxy"}],
                "initContainers": [{"name": "migrate"}]
            },
            "status": {"phase": "Running"}
        }))
        .expect("valid pod");

        let summary = pod_summary(&pod);
        assert_eq!(summary.uid, "p-1");
        assert_eq!(summary.name, "web-7d9c");
        assert_eq!(summary.phase, "Running");
        assert_eq!(summary.container_names, vec!["app", "proxy", "migrate"]);
    }
}
