//! Credential set/unset resolution
//!
//! Turns what the user typed into path expressions and a credential name,
//! resolves the org and project by name, and submits the resulting
//! credential through the daemon.
//!
//! Two input forms:
//! - `name`: the path comes from the addressing flags, with configured
//!   defaults filling whatever was omitted. Multi-valued flags expand to
//!   one path expression per combination.
//! - `path/name`: the path is explicit and the flags that would build it are
//!   ignored. A leading `/` makes it absolute; otherwise it starts at the
//!   environment and takes org and project from context.

use crate::api::Client;
use crate::credential::{self, Credential, CredentialV2, CredentialValue};
use crate::dispatch::ProgressFn;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::identity::EntityKind;
use crate::pathexp::{PartialPathExp, PathExp, SEPARATOR};
use std::sync::Arc;
use strongbox_core::AddressDefaults;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Split `set` arguments into a name and a value
///
/// Accepts `<name> <value>` or a single `<name>=<value>`.
pub fn parse_set_args(args: &[String]) -> Result<(String, String)> {
    let parts: Vec<&str> = match args {
        [single] => single.splitn(2, '=').collect(),
        _ => args.iter().map(String::as_str).collect(),
    };

    match parts.as_slice() {
        [] | [_] => Err(Error::Usage(
            "A secret name and value must be supplied.".to_string(),
        )),
        [name, value] => {
            if name.is_empty() || value.is_empty() {
                return Err(Error::Usage("A secret must have a name and value.".to_string()));
            }
            Ok((name.to_string(), value.to_string()))
        }
        _ => Err(Error::Usage("Too many arguments were provided.".to_string())),
    }
}

/// Addressing flags as given on the command line; empty means omitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFlags {
    pub org: Option<String>,
    pub project: Option<String>,
    pub environment: Vec<String>,
    pub service: Vec<String>,
    pub identity: Vec<String>,
    pub instance: Vec<String>,
}

impl AddressFlags {
    fn org<'a>(&'a self, defaults: &'a AddressDefaults) -> Result<&'a str> {
        required_one(self.org.as_deref().or(defaults.org.as_deref()), "org")
    }

    fn project<'a>(&'a self, defaults: &'a AddressDefaults) -> Result<&'a str> {
        required_one(self.project.as_deref().or(defaults.project.as_deref()), "project")
    }
}

fn required_one<'a>(value: Option<&'a str>, flag: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::validation(format!("--{} is required", flag))),
    }
}

fn or_default<'a>(given: &'a [String], default: &'a [String]) -> &'a [String] {
    if given.is_empty() {
        default
    } else {
        given
    }
}

/// Where a credential goes, before anything is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialTarget {
    pub pathexps: Vec<PathExp>,
    pub name: String,
}

/// Work out the path expressions and name addressed by `name_or_path`
///
/// Purely local; nothing here talks to the registry.
pub fn determine_credential(
    name_or_path: &str,
    flags: &AddressFlags,
    defaults: &AddressDefaults,
) -> Result<CredentialTarget> {
    if let Some(index) = name_or_path.rfind(SEPARATOR) {
        let (path, name) = (&name_or_path[..index], &name_or_path[index + 1..]);
        credential::validate_name(name)?;

        let pathexp = if path.starts_with(SEPARATOR) {
            PartialPathExp::parse(path)?.complete()?
        } else {
            PathExp::parse_relative(flags.org(defaults)?, flags.project(defaults)?, path)?
        };
        debug!(pathexp = %pathexp, name, "Explicit path given, ignoring flags");
        return Ok(CredentialTarget {
            pathexps: vec![pathexp],
            name: name.to_string(),
        });
    }

    let name = name_or_path;
    credential::validate_name(name)?;

    let org = flags.org(defaults)?;
    let project = flags.project(defaults)?;
    let environments = or_default(&flags.environment, &defaults.environment);
    if environments.is_empty() {
        return Err(Error::validation("--environment is required"));
    }

    let pathexps = PathExp::construct(
        org,
        project,
        environments,
        or_default(&flags.service, &defaults.service),
        or_default(&flags.identity, &defaults.identity),
        or_default(&flags.instance, &defaults.instance),
    )?;
    Ok(CredentialTarget {
        pathexps,
        name: name.to_string(),
    })
}

/// Resolve the org and project of `pathexp` and store one credential
///
/// `make_value` is only asked for the value once both lookups succeed.
pub async fn set_credential<F>(
    client: &Client,
    pathexp: &PathExp,
    name: &str,
    make_value: F,
    progress: &ProgressFn,
) -> Result<Envelope<Credential>>
where
    F: FnOnce() -> CredentialValue,
{
    let org = client
        .orgs()
        .get_by_name(pathexp.org())
        .await?
        .ok_or_else(|| Error::not_found("Org not found"))?;

    let mut projects = client
        .projects()
        .search(&org.id, Some(pathexp.project()))
        .await?;
    if projects.len() != 1 {
        return Err(Error::not_found("Project not found"));
    }
    let project = projects.remove(0);

    let body = CredentialV2::new(org.id, project.id, name, pathexp.clone(), make_value())?;
    let envelope = Envelope::mutable(EntityKind::Credential, Credential::V2(body))?;
    info!(id = %envelope.id, pathexp = %pathexp, "Writing credential");

    client.credentials().create(envelope, progress).await
}

/// Store the same value at every path expression of `target`
///
/// Each write runs as its own task and every task is awaited. Results come
/// back in path-expression order; if any write fails the first failure in
/// that order is returned. Dropping the returned future aborts writes that
/// have not reached the daemon yet.
pub async fn set_credentials(
    client: &Client,
    target: &CredentialTarget,
    value: CredentialValue,
    progress: Arc<ProgressFn>,
) -> Result<Vec<Envelope<Credential>>> {
    let mut tasks = JoinSet::new();
    for (index, pathexp) in target.pathexps.iter().cloned().enumerate() {
        let client = client.clone();
        let name = target.name.clone();
        let value = value.clone();
        let progress = progress.clone();
        tasks.spawn(async move {
            let result = set_credential(&client, &pathexp, &name, || value, progress.as_ref()).await;
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<Envelope<Credential>>>> =
        (0..target.pathexps.len()).map(|_| None).collect();
    let mut aborted = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => {
                warn!("Credential write task failed: {}", e);
                aborted.get_or_insert_with(|| format!("credential write aborted: {}", e));
            }
        }
    }

    results
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                let message = aborted
                    .clone()
                    .unwrap_or_else(|| "credential write did not finish".to_string());
                Err(Error::transport(message))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialState;
    use crate::dispatch::{ignore_progress, Dispatcher, ProgressEvent, Request};
    use crate::identity::Identifier;
    use crate::mock::MockRegistry;
    use crate::model::{Org, Project};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Answers lookups from fixed lists and refuses every write
    struct FixedLookups {
        orgs: Vec<Envelope<Org>>,
        projects: Vec<Envelope<Project>>,
    }

    #[async_trait]
    impl Dispatcher for FixedLookups {
        async fn call(&self, request: Request) -> Result<Option<Value>> {
            let list = match request.path.as_str() {
                "/orgs" => self.orgs.iter().cloned().map(Envelope::into_tagged).collect::<Vec<_>>(),
                "/projects" => self.projects.iter().cloned().map(Envelope::into_tagged).collect(),
                other => return Err(Error::transport(format!("no route for {}", other))),
            };
            Ok(Some(serde_json::to_value(list)?))
        }

        async fn call_with_progress(&self, _request: Request, _progress: &ProgressFn) -> Result<Option<Value>> {
            Err(Error::transport("writes are not expected"))
        }
    }

    /// Holds daemon writes until a permit is released
    struct GatedWrites {
        inner: Arc<MockRegistry>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl Dispatcher for GatedWrites {
        async fn call(&self, request: Request) -> Result<Option<Value>> {
            self.inner.call(request).await
        }

        async fn call_with_progress(&self, request: Request, progress: &ProgressFn) -> Result<Option<Value>> {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| Error::transport(e.to_string()))?;
            self.inner.call_with_progress(request, progress).await
        }
    }

    /// Panics on the first daemon write, passes the rest through
    struct PanicOnce {
        inner: Arc<MockRegistry>,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl Dispatcher for PanicOnce {
        async fn call(&self, request: Request) -> Result<Option<Value>> {
            self.inner.call(request).await
        }

        async fn call_with_progress(&self, request: Request, progress: &ProgressFn) -> Result<Option<Value>> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                panic!("daemon connection dropped mid-write");
            }
            self.inner.call_with_progress(request, progress).await
        }
    }

    fn org(seed: &[u8], name: &str) -> Envelope<Org> {
        let id = Identifier::derive(EntityKind::Org, seed).unwrap();
        Envelope::wrap(id, 1, Org { name: name.into() })
    }

    fn project(seed: &[u8], org_id: Identifier, name: &str) -> Envelope<Project> {
        let id = Identifier::derive(EntityKind::Project, seed).unwrap();
        Envelope::wrap(id, 1, Project { org_id, name: name.into() })
    }

    async fn set_tracking_value(client: &Client, pe: &PathExp) -> (Error, bool) {
        let asked = Arc::new(AtomicBool::new(false));
        let flag = asked.clone();
        let err = set_credential(
            client,
            pe,
            "token",
            move || {
                flag.store(true, Ordering::SeqCst);
                CredentialValue::string("x")
            },
            &ignore_progress,
        )
        .await
        .unwrap_err();
        (err, asked.load(Ordering::SeqCst))
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn defaults() -> AddressDefaults {
        AddressDefaults {
            org: Some("acme".into()),
            project: Some("api".into()),
            environment: vec!["dev".into()],
            ..AddressDefaults::default()
        }
    }

    fn seeded() -> (Arc<MockRegistry>, Client) {
        let registry = Arc::new(MockRegistry::new().unwrap());
        let acme = registry.add_org("acme").unwrap();
        registry.add_project(acme, "api").unwrap();
        let client = Client::new(registry.clone());
        (registry, client)
    }

    fn full(text: &str) -> PathExp {
        PathExp::parse_full(text).unwrap()
    }

    #[test]
    fn test_parse_set_args() {
        assert_eq!(
            parse_set_args(&args(&["secretA=value1"])).unwrap(),
            ("secretA".to_string(), "value1".to_string())
        );
        assert_eq!(
            parse_set_args(&args(&["secretA", "value=1"])).unwrap(),
            ("secretA".to_string(), "value=1".to_string())
        );
        assert_eq!(
            parse_set_args(&args(&["url=a=b"])).unwrap(),
            ("url".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn test_parse_set_args_errors() {
        let missing = parse_set_args(&args(&[])).unwrap_err();
        assert_eq!(missing.to_string(), "A secret name and value must be supplied.");
        assert!(matches!(parse_set_args(&args(&["secretA"])), Err(Error::Usage(_))));
        assert!(matches!(parse_set_args(&args(&["secretA="])), Err(Error::Usage(_))));
        assert!(matches!(parse_set_args(&args(&["=value"])), Err(Error::Usage(_))));
        let many = parse_set_args(&args(&["a", "b", "c"])).unwrap_err();
        assert_eq!(many.to_string(), "Too many arguments were provided.");
    }

    #[test]
    fn test_name_uses_flags_and_defaults() {
        let target = determine_credential("secretA", &AddressFlags::default(), &defaults()).unwrap();
        assert_eq!(target.name, "secretA");
        assert_eq!(target.pathexps, vec![full("/acme/api/dev/default/*/*")]);
    }

    #[test]
    fn test_flags_override_defaults() {
        let flags = AddressFlags {
            project: Some("web".into()),
            environment: vec!["staging".into(), "prod".into()],
            instance: vec!["1".into()],
            ..AddressFlags::default()
        };
        let target = determine_credential("token", &flags, &defaults()).unwrap();
        assert_eq!(
            target.pathexps,
            vec![full("/acme/web/staging/default/*/1"), full("/acme/web/prod/default/*/1")]
        );
    }

    #[test]
    fn test_relative_path_ignores_flags() {
        let flags = AddressFlags {
            environment: vec!["prod".into()],
            service: vec!["worker".into()],
            ..AddressFlags::default()
        };
        let target = determine_credential("myenv/myservice/secretB", &flags, &defaults()).unwrap();
        assert_eq!(target.name, "secretB");
        assert_eq!(target.pathexps, vec![full("/acme/api/myenv/myservice/*/*")]);
    }

    #[test]
    fn test_absolute_path() {
        let flags = AddressFlags {
            org: Some("ignored".into()),
            ..AddressFlags::default()
        };
        let target = determine_credential("/beta/site/prod/secretC", &flags, &defaults()).unwrap();
        assert_eq!(target.pathexps, vec![full("/beta/site/prod/*/*/*")]);

        let no_project = determine_credential("/beta/secretC", &flags, &defaults()).unwrap_err();
        assert!(matches!(no_project, Error::Validation(_)));
    }

    #[test]
    fn test_required_flags() {
        let bare = AddressDefaults::default();
        let err = determine_credential("token", &AddressFlags::default(), &bare).unwrap_err();
        assert_eq!(err.to_string(), "--org is required");

        let flags = AddressFlags {
            org: Some("acme".into()),
            project: Some("api".into()),
            ..AddressFlags::default()
        };
        let err = determine_credential("token", &flags, &bare).unwrap_err();
        assert_eq!(err.to_string(), "--environment is required");

        let err = determine_credential("dev/token", &AddressFlags::default(), &bare).unwrap_err();
        assert_eq!(err.to_string(), "--org is required");
    }

    #[test]
    fn test_bad_path_is_parse_error() {
        let result = determine_credential("dev env/token", &AddressFlags::default(), &defaults());
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    fn prefix() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[a-z]{1,8}(/[a-z]{1,8}){0,3}/",
            "/[a-z]{1,8}/[a-z]{1,8}(/[a-z]{1,8}){0,4}/",
        ]
    }

    proptest! {
        #[test]
        fn prop_wildcard_name_rejected(prefix in prefix(), org in "[a-z]{1,8}") {
            let flags = AddressFlags { org: Some(org), ..AddressFlags::default() };
            let input = format!("{}*", prefix);
            let result = determine_credential(&input, &flags, &defaults());
            prop_assert!(matches!(result, Err(Error::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_set_credential() {
        let (registry, client) = seeded();
        let pe = full("/acme/api/dev/default/*/*");
        let stored = set_credential(&client, &pe, "Token", || CredentialValue::string("s3cret"), &ignore_progress)
            .await
            .unwrap();

        assert_eq!(stored.version, 1);
        assert_eq!(stored.id.kind(), EntityKind::Credential);
        assert_eq!(stored.body.name(), "token");
        assert_eq!(stored.body.state(), CredentialState::Set);
        assert_eq!(stored.body.value(), Some("s3cret"));
        assert_eq!(registry.credentials().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rewrite_bumps_version() {
        let (registry, client) = seeded();
        let pe = full("/acme/api/dev/default/*/*");
        let first = set_credential(&client, &pe, "token", || CredentialValue::string("a"), &ignore_progress)
            .await
            .unwrap();
        let second = set_credential(&client, &pe, "token", || CredentialValue::Unset, &ignore_progress)
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.version, 2);
        assert_eq!(second.body.state(), CredentialState::Unset);
        assert_eq!(second.body.value(), None);
        assert_eq!(registry.credentials().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_org_not_found() {
        let (registry, client) = seeded();
        let pe = full("/nowhere/api/dev/default/*/*");
        let asked = Arc::new(Mutex::new(false));
        let flag = asked.clone();
        let err = set_credential(
            &client,
            &pe,
            "token",
            move || {
                *flag.lock().unwrap() = true;
                CredentialValue::string("x")
            },
            &ignore_progress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "Org not found");
        assert!(!*asked.lock().unwrap());
        assert_eq!(registry.requests().unwrap(), vec!["GET /orgs"]);
    }

    #[tokio::test]
    async fn test_project_not_found() {
        let (registry, client) = seeded();
        let pe = full("/acme/nope/dev/default/*/*");
        let err = set_credential(&client, &pe, "token", || CredentialValue::string("x"), &ignore_progress)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Project not found");
        assert!(registry.credentials().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_org_not_found() {
        let client = Client::new(Arc::new(FixedLookups {
            orgs: vec![org(b"acme-1", "acme"), org(b"acme-2", "acme")],
            projects: Vec::new(),
        }));
        let (err, asked) = set_tracking_value(&client, &full("/acme/api/dev/default/*/*")).await;
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!asked);
    }

    #[tokio::test]
    async fn test_ambiguous_project_not_found() {
        let acme = org(b"acme", "acme");
        let client = Client::new(Arc::new(FixedLookups {
            projects: vec![project(b"api-1", acme.id, "api"), project(b"api-2", acme.id, "api")],
            orgs: vec![acme],
        }));
        let (err, asked) = set_tracking_value(&client, &full("/acme/api/dev/default/*/*")).await;
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "Project not found");
        assert!(!asked);
    }

    #[tokio::test]
    async fn test_version_overflow_keeps_last_write() {
        let (registry, client) = seeded();
        let pe = full("/acme/api/dev/default/*/*");
        for round in 0..u8::MAX {
            let value = CredentialValue::string(format!("v{}", round));
            set_credential(&client, &pe, "token", || value, &ignore_progress)
                .await
                .unwrap();
        }
        let stored = registry.credentials().unwrap();
        assert_eq!(stored[0].version, u8::MAX);

        let err = set_credential(&client, &pe, "token", || CredentialValue::string("late"), &ignore_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        let stored = registry.credentials().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].version, u8::MAX);
        assert_eq!(stored[0].body.value(), Some("v254"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_not_found() {
        let (registry, client) = seeded();
        registry.fail_on("/orgs", "connection reset").unwrap();
        let pe = full("/acme/api/dev/default/*/*");
        let err = set_credential(&client, &pe, "token", || CredentialValue::string("x"), &ignore_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_bulk_set_in_order() {
        let (registry, client) = seeded();
        let flags = AddressFlags {
            environment: vec!["dev".into(), "staging".into(), "prod".into()],
            ..AddressFlags::default()
        };
        let target = determine_credential("token", &flags, &defaults()).unwrap();

        let events = Arc::new(Mutex::new(0usize));
        let counter = events.clone();
        let progress: Arc<ProgressFn> = Arc::new(move |_: &ProgressEvent| *counter.lock().unwrap() += 1);

        let stored = set_credentials(&client, &target, CredentialValue::string("v"), progress)
            .await
            .unwrap();
        let paths: Vec<&PathExp> = stored.iter().map(|c| c.body.pathexp()).collect();
        let expected: Vec<&PathExp> = target.pathexps.iter().collect();
        assert_eq!(paths, expected);
        assert_eq!(registry.credentials().unwrap().len(), 3);
        assert!(*events.lock().unwrap() >= 3);
    }

    #[tokio::test]
    async fn test_bulk_set_reports_failure() {
        let (_registry, client) = seeded();
        let target = CredentialTarget {
            pathexps: vec![full("/acme/api/dev/*/*/*"), full("/acme/missing/dev/*/*/*")],
            name: "token".into(),
        };
        let progress: Arc<ProgressFn> = Arc::new(ignore_progress);
        let err = set_credentials(&client, &target, CredentialValue::Unset, progress)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Project not found");
    }

    #[tokio::test]
    async fn test_dropped_bulk_set_stores_nothing() {
        let (registry, _) = seeded();
        let gate = Arc::new(Semaphore::new(0));
        let client = Client::new(Arc::new(GatedWrites {
            inner: registry.clone(),
            gate: gate.clone(),
        }));
        let target = CredentialTarget {
            pathexps: vec![full("/acme/api/dev/*/*/*"), full("/acme/api/prod/*/*/*")],
            name: "token".into(),
        };
        let progress: Arc<ProgressFn> = Arc::new(ignore_progress);

        let pending = set_credentials(&client, &target, CredentialValue::string("v"), progress);
        let timed_out = tokio::time::timeout(Duration::from_millis(100), pending).await;
        assert!(timed_out.is_err());

        gate.add_permits(target.pathexps.len());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.credentials().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_set_waits_for_every_task() {
        let (registry, _) = seeded();
        let client = Client::new(Arc::new(PanicOnce {
            inner: registry.clone(),
            tripped: AtomicBool::new(false),
        }));
        let target = CredentialTarget {
            pathexps: vec![
                full("/acme/api/dev/*/*/*"),
                full("/acme/api/staging/*/*/*"),
                full("/acme/api/prod/*/*/*"),
            ],
            name: "token".into(),
        };
        let progress: Arc<ProgressFn> = Arc::new(ignore_progress);

        let err = set_credentials(&client, &target, CredentialValue::string("v"), progress)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("credential write aborted"));
        assert_eq!(registry.credentials().unwrap().len(), 2);
    }
}
