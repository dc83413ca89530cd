//! A two-turn exchange: the producer's batch is executed, the user edits a
//! file out-of-band, and the edit is reported back through a
//! `<modifications>` preamble that a second session folds into its snapshot.

use changeset::error::{ExecutorError, ProtocolError};
use changeset::executor::{CommandExecutor, CommandOutput};
use changeset::persistence::MemoryPersistence;
use changeset::session::ModificationStatus;
use changeset::{
    CancellationToken, ChangesetError, FileContent, FilePath, ModificationEntry, ResponseProtocol, Session,
    WorkspaceRoot,
};

struct EchoExecutor;

impl CommandExecutor for EchoExecutor {
    fn run(&self, command_line: &str, _cancel: &CancellationToken) -> Result<CommandOutput, ExecutorError> {
        Ok(CommandOutput {
            exit_status: 0,
            stdout: command_line.to_string(),
            stderr: String::new(),
        })
    }
}

fn session() -> Session {
    Session::new(
        WorkspaceRoot::detached("/home/project"),
        MemoryPersistence::new(),
        EchoExecutor,
    )
}

const RESPONSE: &str = r#"I'll set up the project.

<batch id="todo-app" title="Todo app">
  <action kind="file" path="/home/project/package.json">
{
  "name": "todo",
  "scripts": { "start": "node index.js" }
}
  </action>
  <action kind="file" path="index.js">
const items = [];
function add(item) {
  items.push(item);
}
function list() {
  return items;
}
function clear() {
  items.length = 0;
}
function count() {
  return items.length;
}
function first() {
  return items[0];
}
function last() {
  return items[items.length - 1];
}
module.exports = { add, list, clear, count, first, last };
  </action>
  <action kind="command">
    npm start
  </action>
</batch>
"#;

#[test]
fn batch_then_modifications_round_trip() {
    let protocol = ResponseProtocol::default();
    let batch = protocol.parse_batch(RESPONSE).unwrap();
    assert_eq!(batch.len(), 3);

    let mut producer_side = session();
    let result = producer_side.execute(batch.clone());
    assert!(result.is_success());
    assert_eq!(result.reports[0].path.as_deref(), Some("package.json"));
    assert_eq!(result.reports[2].output.as_ref().unwrap().stdout, "npm start");

    // The user edits one line of index.js and creates a new file.
    let index = FilePath::parse("index.js").unwrap();
    let before = producer_side.snapshot().get(&index).unwrap().clone();
    let edited = FileContent::new(before.as_str().replace("items.push(item);", "items.push(item.trim());"));
    let notes = FilePath::parse("NOTES.md").unwrap();
    let mods = producer_side.collect_modifications(vec![
        (index.clone(), edited.clone()),
        (notes.clone(), FileContent::from("remember the milk\n")),
    ]);
    assert_eq!(mods.len(), 2);
    assert!(matches!(mods.entries()[0].entry, ModificationEntry::Diff { .. }));
    assert!(matches!(mods.entries()[1].entry, ModificationEntry::Full { .. }));

    let preamble = protocol.render_modifications(&mods).unwrap();
    assert!(preamble.starts_with("<modifications>\n<diff path=\"index.js\">\n@@ "));

    // A second session that saw the same batch folds the preamble in.
    let mut consumer_side = session();
    consumer_side.execute(protocol.parse_batch(RESPONSE).unwrap());
    let parsed = protocol.parse_modifications(&preamble).unwrap();
    let outcomes = consumer_side.apply_modifications(&parsed);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o.status, ModificationStatus::Applied { .. })));

    assert_eq!(consumer_side.snapshot().get(&index), Some(&edited));
    assert_eq!(
        consumer_side.snapshot().get(&notes).map(FileContent::as_str),
        Some("remember the milk\n")
    );
}

#[test]
fn revised_batch_with_same_id_replaces_the_first() {
    let protocol = ResponseProtocol::default();
    let mut session = session();
    session.execute(protocol.parse_batch(RESPONSE).unwrap());

    let revision = r#"<batch id="todo-app" title="Todo app (fixed)">
<action kind="file" path="index.js">
module.exports = {};
</action>
</batch>"#;
    session.execute(protocol.parse_batch(revision).unwrap());

    let record = session.batch("todo-app").unwrap();
    assert_eq!(record.revision, 2);
    assert_eq!(record.batch.title, "Todo app (fixed)");
    assert_eq!(record.batch.len(), 1);
    let index = FilePath::parse("index.js").unwrap();
    assert_eq!(session.snapshot().revision(&index), Some(2));
}

#[test]
fn malformed_response_surfaces_before_execution() {
    let protocol = ResponseProtocol::default();
    let text = r#"<batch id="x" title="t"><action kind="upload" path="a">data</action></batch>"#;
    let err: ChangesetError = protocol.parse_batch(text).unwrap_err().into();
    assert!(matches!(err, ChangesetError::Protocol(ProtocolError::MalformedBatch { .. })));
}
