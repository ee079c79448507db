mod common;

use common::*;

use jarsmith::core::classfile::{ClassFile, ACC_PUBLIC, ACC_SUPER};
use jarsmith::core::jar::{JarConfiguration, JarKind};
use jarsmith::core::pipeline::StageOutcome;
use jarsmith::{Pipeline, PipelineError};

const SHARED_VERSION: &str = "build_assets/version.txt";

struct Game {
    client: Vec<u8>,
    server: Vec<u8>,
}

fn game() -> Game {
    let world = class_bytes("game/World", ACC_SUPER);
    Game {
        client: jar_bytes(&[
            ("game/World.class", &world),
            ("game/Renderer.class", &class_bytes("game/Renderer", ACC_PUBLIC)),
            (SHARED_VERSION, b"1.0"),
        ]),
        server: jar_bytes(&[
            ("game/World.class", &world),
            ("game/Network.class", &class_bytes("game/Network", ACC_PUBLIC)),
        ]),
    }
}

fn serve_both(server: &FileServer, game: &Game) {
    let client_url = server.serve("/client.jar", game.client.clone());
    let server_url = server.serve("/server.jar", game.server.clone());
    server.serve(
        "/versions.json",
        manifest(
            Some((&client_url, &sha256(&game.client))),
            Some((&server_url, &sha256(&game.server))),
        ),
    );
}

#[tokio::test]
async fn second_run_reuses_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let server = FileServer::start().await;
    serve_both(&server, &game());

    let widener = dir.path().join("project.accesswidener");
    std::fs::write(&widener, "accessWidener v1 named\naccessible class game/World\n").unwrap();
    let mut config = config(dir.path(), &server, JarConfiguration::Merged);
    config.access_widener = Some(widener);

    let first = Pipeline::new(config.clone()).unwrap().run().await.unwrap();
    assert_eq!(first.report.len(), 5);
    assert!(first.report.iter().all(|r| r.outcome == StageOutcome::Produced));
    assert_eq!(first.jars.len(), 1);

    let published = &first.jars[0];
    assert_eq!(published.jar.kind(), JarKind::Merged);
    assert!(published.jar.path().starts_with(dir.path().join("project")));
    assert!(published.notation.starts_with("net.jarsmith.game:game:1.0:merged-"));

    let world = read_entry(published.jar.path(), "game/World.class").unwrap();
    assert_eq!(ClassFile::parse(&world).unwrap().access & ACC_PUBLIC, ACC_PUBLIC);
    assert!(read_entry(published.jar.path(), "game/Renderer.class").is_some());
    assert!(read_entry(published.jar.path(), "game/Network.class").is_some());

    let bytes = std::fs::read(published.jar.path()).unwrap();
    let hits = server.hits();

    let second = Pipeline::new(config).unwrap().run().await.unwrap();
    assert!(second.fully_cached(), "{:?}", second.report);
    assert_eq!(server.hits(), hits);
    assert_eq!(second.dependencies(), first.dependencies());
    assert_eq!(std::fs::read(second.jars[0].jar.path()).unwrap(), bytes);
}

#[tokio::test]
async fn server_only_release_needs_server_only_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let server = FileServer::start().await;
    let game = game();
    let server_url = server.serve("/server.jar", game.server.clone());
    server.serve(
        "/versions.json",
        manifest(None, Some((&server_url, &sha256(&game.server)))),
    );

    let merged = config(dir.path(), &server, JarConfiguration::Merged);
    let err = Pipeline::new(merged).unwrap().run().await.unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedConfiguration(_)), "{}", err);

    let server_only = config(dir.path(), &server, JarConfiguration::ServerOnly);
    let result = Pipeline::new(server_only).unwrap().run().await.unwrap();
    assert_eq!(result.jars.len(), 1);
    assert_eq!(result.jars[0].jar.kind(), JarKind::Server);
    assert_eq!(result.jars[0].notation, "net.jarsmith.game:game:1.0:server-named");
    // Without processor rules the named GLOBAL slot is the final artifact.
    assert!(result.jars[0].jar.path().starts_with(global_repo(dir.path())));
    assert_eq!(result.report.len(), 4);
}

/// Serves the game with the given sides' digests replaced and runs
/// `jars`, expecting the integrity check to reject the download.
async fn run_with_bad_digests(bad_client: bool, bad_server: bool, jars: JarConfiguration) {
    let dir = tempfile::tempdir().unwrap();
    let server = FileServer::start().await;
    let game = game();
    let digest = |bytes: &[u8], bad: bool| {
        if bad {
            sha256(b"something else")
        } else {
            sha256(bytes)
        }
    };
    let client_url = server.serve("/client.jar", game.client.clone());
    let server_url = server.serve("/server.jar", game.server.clone());
    let client_sha = digest(&game.client, bad_client);
    let server_sha = digest(&game.server, bad_server);
    server.serve(
        "/versions.json",
        manifest(Some((&client_url, &client_sha)), Some((&server_url, &server_sha))),
    );

    let config = config(dir.path(), &server, jars);
    let working = config.working_dir();
    let err = Pipeline::new(config).unwrap().run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Integrity { .. }), "{}", err);

    let names: Vec<String> = std::fs::read_dir(&working)
        .map(|d| {
            d.filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    // Neither a final jar nor a `.part` file survives.
    assert!(names.is_empty(), "{:?}", names);
}

#[tokio::test]
async fn client_digest_mismatch_leaves_no_file() {
    run_with_bad_digests(true, false, JarConfiguration::ClientOnly).await;
}

#[tokio::test]
async fn server_digest_mismatch_leaves_no_file() {
    run_with_bad_digests(false, true, JarConfiguration::ServerOnly).await;
}

#[tokio::test]
async fn mismatch_on_both_sides_leaves_no_file() {
    run_with_bad_digests(true, true, JarConfiguration::Merged).await;
}

#[tokio::test]
async fn concurrent_projects_share_complete_global_slots() {
    let dir = tempfile::tempdir().unwrap();
    let server = FileServer::start().await;
    serve_both(&server, &game());

    let widener = dir.path().join("project.accesswidener");
    std::fs::write(&widener, "accessWidener v1 named\naccessible class game/World\n").unwrap();
    let mut first = config(dir.path(), &server, JarConfiguration::Merged);
    first.access_widener = Some(widener);
    let mut second = first.clone();
    first.project_root = dir.path().join("project-a");
    second.project_root = dir.path().join("project-b");

    let (a, b) = tokio::join!(
        async move { Pipeline::new(first).unwrap().run().await },
        async move { Pipeline::new(second).unwrap().run().await },
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let slots = global_repo(dir.path()).join("net/jarsmith/game/game/1.0");
    for namespace in ["intermediary", "named"] {
        let jar = slots.join(format!("game-1.0-merged-{}.jar", namespace));
        assert!(jar.exists(), "{:?}", jar);
        assert!(jar.with_extension("jar.backup").exists(), "{:?}", jar);
    }
    assert_eq!(a.dependencies(), b.dependencies());
    assert_ne!(a.jars[0].jar.path(), b.jars[0].jar.path());
    let world = |r: &jarsmith::ProvisionResult| read_entry(r.jars[0].jar.path(), "game/World.class");
    assert_eq!(world(&a), world(&b));
}

#[tokio::test]
async fn unknown_version_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let server = FileServer::start().await;
    server.serve("/versions.json", br#"{"versions":[]}"#.to_vec());

    let config = config(dir.path(), &server, JarConfiguration::Merged);
    let err = Pipeline::new(config).unwrap().run().await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }), "{}", err);
}

#[tokio::test]
async fn mod_rule_change_only_reprocesses_the_local_slot() {
    let dir = tempfile::tempdir().unwrap();
    let server = FileServer::start().await;
    serve_both(&server, &game());

    let mod_dir = dir.path().join("mods").join("example");
    std::fs::create_dir_all(&mod_dir).unwrap();
    std::fs::write(
        mod_dir.join("fabric.mod.json"),
        r#"{"id":"example","accessWidener":"example.accesswidener"}"#,
    )
    .unwrap();
    let rules = mod_dir.join("example.accesswidener");
    std::fs::write(&rules, "accessWidener v2 named\ntransitive-accessible class game/World\n").unwrap();

    let mut config = config(dir.path(), &server, JarConfiguration::Merged);
    config.mods = vec![mod_dir.clone()];

    let first = Pipeline::new(config.clone()).unwrap().run().await.unwrap();
    let first_jar = first.jars[0].jar.path().to_path_buf();
    let named_backup = global_repo(dir.path())
        .join("net/jarsmith/game/game/1.0/game-1.0-merged-named.jar.backup");
    let named_bytes = std::fs::read(&named_backup).unwrap();

    std::fs::write(&rules, "accessWidener v2 named\ntransitive-extendable class game/World\n").unwrap();
    let second = Pipeline::new(config).unwrap().run().await.unwrap();

    let outcomes: Vec<StageOutcome> = second.report.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            StageOutcome::Reused,
            StageOutcome::Reused,
            StageOutcome::Reused,
            StageOutcome::Reused,
            StageOutcome::Produced,
        ]
    );
    assert_ne!(second.dependencies(), first.dependencies());
    assert_eq!(std::fs::read(&named_backup).unwrap(), named_bytes);
    // The slot processed with the old hash is cleaned up.
    assert!(!first_jar.exists());
    assert!(second.jars[0].jar.path().exists());
}

#[tokio::test]
async fn split_requires_a_bundled_server() {
    let dir = tempfile::tempdir().unwrap();
    let server = FileServer::start().await;
    serve_both(&server, &game());

    let config = config(dir.path(), &server, JarConfiguration::Split);
    let err = Pipeline::new(config).unwrap().run().await.unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedConfiguration(_)), "{}", err);
}

#[tokio::test]
async fn split_bundle_into_common_and_client_only() {
    let dir = tempfile::tempdir().unwrap();
    let server = FileServer::start().await;
    let game = game();

    let list = format!("{}\tgame-1.0\tserver-1.0.jar\n", sha256(&game.server));
    let bundle = jar_bytes(&[
        ("META-INF/versions.list", list.as_bytes()),
        ("META-INF/versions/server-1.0.jar", &game.server),
    ]);
    let client_url = server.serve("/client.jar", game.client.clone());
    let bundle_url = server.serve("/server.jar", bundle.clone());
    server.serve(
        "/versions.json",
        manifest(
            Some((&client_url, &sha256(&game.client))),
            Some((&bundle_url, &sha256(&bundle))),
        ),
    );

    let widener = dir.path().join("project.accesswidener");
    std::fs::write(&widener, "accessWidener v1 named\naccessible class game/World\n").unwrap();
    let mut config = config(dir.path(), &server, JarConfiguration::Split);
    config.access_widener = Some(widener);

    let result = Pipeline::new(config).unwrap().run().await.unwrap();
    let kinds: Vec<JarKind> = result.jars.iter().map(|p| p.jar.kind()).collect();
    assert_eq!(kinds, vec![JarKind::Common, JarKind::ClientOnly]);

    let common = result.jars[0].jar.path();
    let client_only = result.jars[1].jar.path();
    assert!(read_entry(common, "game/Network.class").is_some());
    assert!(read_entry(common, "game/World.class").is_some());
    assert!(read_entry(client_only, "game/Renderer.class").is_some());
    assert!(read_entry(client_only, "game/World.class").is_none());
    // Shared entries land in both halves.
    assert_eq!(read_entry(common, SHARED_VERSION).unwrap(), b"1.0");
    assert_eq!(read_entry(client_only, SHARED_VERSION).unwrap(), b"1.0");

    let world = read_entry(common, "game/World.class").unwrap();
    assert_eq!(ClassFile::parse(&world).unwrap().access & ACC_PUBLIC, ACC_PUBLIC);
}
