use http::StatusCode;
use tracing_subscriber::EnvFilter;

use super::*;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[derive(Clone, Default, Debug)]
struct Post {
    title: String,
}

impl Post {
    fn titled(title: &str) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Record for Post {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Title", |post| &post.title);
    }
}

#[derive(Clone, Default)]
struct Blog {
    posts: Vec<Post>,
}

impl Record for Blog {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Posts", |blog| &blog.posts);
    }
}

fn blog() -> Blog {
    Blog {
        posts: vec![Post::titled("first"), Post::titled("second")],
    }
}

fn context(registry: &Registry, ids: IdMap) -> Context<'_> {
    Context::new(registry, Request::new(Vec::new()), &ResponseWriter::new(), ids)
}

/// Map a handler on the resource found at `path`, the root if there is none
fn mapped<V: Reflect, Ret: 'static>(
    root: &V,
    path: &str,
    handler: &Handler<Ret>,
) -> Result<Registry, BuildError> {
    let tree = ResourceTree::build(root)?;
    let node = tree.find(path).unwrap_or(tree.root());
    Ok(Registry::builder()
        .index(&tree)?
        .handler(&tree, node, handler)?
        .build())
}

#[test]
fn blog_resources() -> Result<(), BuildError> {
    init_logging();
    let tree = ResourceTree::build(&blog())?;
    assert_eq!(tree.len(), 3);

    let root = tree.get(tree.root()).unwrap();
    assert_eq!(root.name(), "blog");
    assert_eq!(root.ty(), &Ty::ptr(Blog::ty()));
    assert_eq!(root.children().len(), 1);

    let posts = tree.get(root.children()[0]).unwrap();
    assert_eq!(posts.name(), "posts");
    assert!(posts.is_slice());
    assert!(posts.children().is_empty());
    assert_eq!(posts.ty(), &Ty::ptr(Ty::seq(Post::ty())));

    let elem = tree.get(posts.elem().unwrap()).unwrap();
    assert_eq!(elem.name(), "posts");
    assert!(!elem.is_slice());
    assert!(elem.children().is_empty());
    assert_eq!(elem.ty(), &Ty::ptr(Post::ty()));

    // the first post is the template of the element
    let template = elem.value().downcast_ref::<Post>().unwrap();
    assert_eq!(template.title, "first");

    assert_eq!(
        tree.to_string(),
        "[blog] Ptr<Blog>\n  [posts] Ptr<Vec<Post>>\n    [posts] Ptr<Post>\n"
    );
    Ok(())
}

#[test]
fn empty_sequence_uses_blank_element() -> Result<(), BuildError> {
    let tree = ResourceTree::build_named(&Blog::default(), "Journal", "json")?;
    let root = tree.get(tree.root()).unwrap();
    assert_eq!(root.name(), "journal");
    assert_eq!(root.tag(), "json");

    let posts = tree.find("posts").and_then(|id| tree.get(id)).unwrap();
    let elem = tree.get(posts.elem().unwrap()).unwrap();
    let template = elem.value().downcast_ref::<Post>().unwrap();
    assert!(template.title.is_empty());
    Ok(())
}

#[derive(Clone, Default)]
struct Hidden {
    posts: Vec<Post>,
    label: String,
}

impl Record for Hidden {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("posts", |hidden| &hidden.posts)
            .field("Label", |hidden| &hidden.label);
    }
}

#[test]
fn only_exported_eligible_fields_are_mapped() -> Result<(), BuildError> {
    let tree = ResourceTree::build(&Hidden::default())?;
    assert_eq!(tree.len(), 1);
    assert!(tree.get(tree.root()).unwrap().children().is_empty());

    match ResourceTree::build(&42u32) {
        Err(BuildError::InvalidShape { ty, .. }) => assert_eq!(ty, u32::ty()),
        _ => panic!("a number is not a resource"),
    }
    Ok(())
}

#[derive(Clone, Default)]
struct Node {
    next: Option<Box<Node>>,
}

impl Record for Node {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Next", |node| &node.next);
    }
}

#[derive(Clone, Default)]
struct Left {
    right: Option<Box<Right>>,
}

impl Record for Left {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Right", |left| &left.right);
    }
}

#[derive(Clone, Default)]
struct Right {
    left: Option<Box<Left>>,
}

impl Record for Right {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Left", |right| &right.left);
    }
}

#[derive(Clone, Default)]
struct Folder {
    folders: Vec<Folder>,
}

impl Record for Folder {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Folders", |folder| &folder.folders);
    }
}

#[test]
fn circular_dependencies() {
    match ResourceTree::build(&Node::default()) {
        Err(BuildError::CircularDependency { name, ancestor, .. }) => {
            assert_eq!(name, "next");
            assert_eq!(ancestor, "node");
        }
        _ => panic!("a node can't contain itself"),
    }

    match ResourceTree::build(&Left::default()) {
        Err(BuildError::CircularDependency {
            name, ancestor_ty, ..
        }) => {
            assert_eq!(name, "left");
            assert_eq!(ancestor_ty, Ty::ptr(Left::ty()));
        }
        _ => panic!("left and right contain each other"),
    }

    assert!(matches!(
        ResourceTree::build(&Folder::default()),
        Err(BuildError::CircularDependency { .. })
    ));
}

#[derive(Clone, Default)]
struct Crowded {
    posts: Vec<Post>,
    more: Vec<Post>,
}

impl Record for Crowded {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Posts", |crowded| &crowded.posts)
            .field("POSTS", |crowded| &crowded.more);
    }
}

#[derive(Clone, Default)]
struct Header {
    title: String,
}

impl Record for Header {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Title", |header| &header.title);
    }
}

#[derive(Clone, Default)]
struct Archive {
    posts: Vec<Post>,
}

impl Record for Archive {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Posts", |archive| &archive.posts);
    }
}

#[derive(Clone, Default)]
struct Page {
    posts: Vec<Post>,
    header: Header,
}

impl Record for Page {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Posts", |page| &page.posts)
            .embed("Posts", |page| &page.header);
    }
}

#[derive(Clone, Default)]
struct Shadowed {
    posts: Vec<Post>,
    archive: Archive,
}

impl Record for Shadowed {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Posts", |shadowed| &shadowed.posts)
            .embed("Archive", |shadowed| &shadowed.archive);
    }
}

#[derive(Clone, Default)]
struct Library {
    archive: Archive,
}

impl Record for Library {
    fn declare(schema: &mut Schema<Self>) {
        schema.embed("Archive", |library| &library.archive);
    }
}

#[test]
fn sibling_names() -> Result<(), BuildError> {
    match ResourceTree::build(&Crowded::default()) {
        Err(BuildError::NameCollision { name, .. }) => assert_eq!(name, "posts"),
        _ => panic!("names are compared case-insensitively"),
    }

    // anonymous resources don't take part in the naming
    let tree = ResourceTree::build(&Page::default())?;
    let root = tree.get(tree.root()).unwrap();
    assert_eq!(root.children().len(), 1);
    assert_eq!(root.extends().len(), 1);
    assert!(tree.get(root.extends()[0]).unwrap().is_anonymous());

    // but their children are promoted into their parent
    assert!(matches!(
        ResourceTree::build(&Shadowed::default()),
        Err(BuildError::NameCollision { .. })
    ));

    let tree = ResourceTree::build(&Library::default())?;
    let posts = tree.find("posts").and_then(|id| tree.get(id)).unwrap();
    assert_eq!(posts.ty(), &Ty::ptr(Ty::seq(Post::ty())));
    Ok(())
}

#[derive(Clone, Default)]
struct Comment {
    body: String,
}

impl Record for Comment {
    fn declare(schema: &mut Schema<Self>) {
        schema.tagged("Body", "text", |comment| &comment.body);
    }
}

#[derive(Clone, Default)]
struct Thread {
    subject: String,
    comments: Vec<Comment>,
}

impl Record for Thread {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Subject", |thread| &thread.subject)
            .tagged("Comments", "replies", |thread| &thread.comments);
    }
}

#[derive(Clone, Default)]
struct Forum {
    threads: Vec<Thread>,
}

impl Record for Forum {
    fn declare(schema: &mut Schema<Self>) {
        schema.field("Threads", |forum| &forum.threads);
    }
}

#[test]
fn navigate_and_look_up_values() -> Result<(), BuildError> {
    let forum = Forum {
        threads: vec![Thread {
            subject: "hello".into(),
            comments: vec![Comment::default()],
        }],
    };
    let tree = ResourceTree::build(&forum)?;

    let comments = tree.find("/Threads/comments/").unwrap();
    let node = tree.get(comments).unwrap();
    assert_eq!(node.tag(), "replies");
    assert!(node.is_slice());
    assert!(tree.find("threads/missing").is_none());

    let thread = tree.value_of(comments, &Thread::ty()).unwrap();
    assert_eq!(thread.downcast_ref::<Thread>().unwrap().subject, "hello");
    assert_eq!(tree.value_of(comments, &Forum::ty()).unwrap().ty(), &Ty::ptr(Forum::ty()));
    assert!(tree.value_of(comments, &Post::ty()).is_none());
    Ok(())
}

#[test]
fn resolve_blog_post() -> Result<(), BoxError> {
    init_logging();
    let handler = Handler::new::<Post, _, _>(|post: Ptr<Post>| post.borrow().title.clone())?;
    let registry = mapped(&blog(), "posts", &handler)?;

    let mut ctx = context(&registry, IdMap::new());
    assert_eq!(ctx.invoke(&handler)?, "first");
    Ok(())
}

#[test]
fn nullable_pointer_parameter() -> Result<(), BoxError> {
    let handler = Handler::new::<Blog, _, _>(|post: Option<Box<Post>>| post.map(|post| post.title))?;
    let registry = mapped(&blog(), "posts", &handler)?;

    let mut ctx = context(&registry, IdMap::new());
    assert_eq!(ctx.invoke(&handler)?, Some("first".to_string()));
    Ok(())
}

trait Greeter {
    fn greet(&self) -> String;
}

#[derive(Clone, Default)]
struct Host {
    name: String,
}

impl Greeter for Host {
    fn greet(&self) -> String {
        format!("hello from {}", self.name)
    }
}

impl Record for Host {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Name", |host| &host.name)
            .implements::<dyn Greeter>(|host| host);
    }
}

#[derive(Clone, Default)]
struct Site {
    host: Host,
    posts: Vec<Post>,
}

impl Record for Site {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Host", |site| &site.host)
            .field("Posts", |site| &site.posts);
    }
}

fn site() -> Site {
    Site {
        host: Host {
            name: "rust".into(),
        },
        posts: Vec::new(),
    }
}

#[test]
fn values_are_shared_within_a_request() -> Result<(), BoxError> {
    let handler = Handler::new::<Site, _, _>(
        |greeter: Iface<dyn Greeter>, host: Ptr<Host>, other: Ptr<Host>, copy: Host| {
            host.borrow_mut().name = "changed".into();
            (Ptr::ptr_eq(&host, &other), greeter.borrow().greet(), copy.name)
        },
    )?;
    let registry = mapped(&site(), "", &handler)?;

    let mut ctx = context(&registry, IdMap::new());
    let (same, greeting, copy) = ctx.invoke(&handler)?;
    assert!(same);
    assert_eq!(greeting, "hello from changed");
    assert_eq!(copy, "rust");
    let hosts = ctx
        .values()
        .iter()
        .filter(|value| value.ty() == &Ty::ptr(Host::ty()))
        .count();
    assert_eq!(hosts, 1);

    // a new request starts from the initial values
    let check = Handler::new::<Site, _, _>(|host: Host| host.name)?;
    let mut ctx = context(&registry, IdMap::new());
    assert_eq!(ctx.invoke(&check)?, "rust");
    Ok(())
}

#[test]
fn interface_is_resolved_once_per_request() -> Result<(), BoxError> {
    let handler = Handler::new::<Site, _, _>(|a: Iface<dyn Greeter>, b: Iface<dyn Greeter>| {
        Iface::ptr_eq(&a, &b)
    })?;
    let registry = mapped(&site(), "", &handler)?;

    let mut ctx = context(&registry, IdMap::new());
    assert!(ctx.invoke(&handler)?);
    assert_eq!(ctx.values().len(), 3);
    Ok(())
}

#[test]
fn registry_lookups_share_the_entry() -> Result<(), BuildError> {
    let tree = ResourceTree::build(&site())?;
    let registry = Registry::builder().index(&tree)?.build();
    let greeter = Ty::Base(BaseType::of::<dyn Greeter>(Kind::Interface));

    let by_iface = registry.resolve(&greeter).unwrap();
    let by_value = registry.resolve(&Host::ty()).unwrap();
    assert!(std::ptr::eq(by_iface, by_value));
    assert_eq!(by_iface.value().ty(), &Ty::ptr(Host::ty()));
    assert!(std::ptr::eq(registry.resolve(&greeter).unwrap(), by_iface));
    assert!(registry.resolve(&Settings::ty()).is_none());
    Ok(())
}

trait Absent {}

#[test]
fn unsatisfied_interface_fails_at_request_time() -> Result<(), BoxError> {
    let handler = Handler::new::<Site, _, _>(|_absent: Iface<dyn Absent>| ())?;
    let registry = mapped(&site(), "", &handler)?;

    let mut ctx = context(&registry, IdMap::new());
    match ctx.invoke(&handler) {
        Err(err @ ResolveError::Unsatisfied(_)) => {
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR)
        }
        _ => panic!("nothing implements this interface"),
    }
    Ok(())
}

#[derive(Clone, Default)]
struct Session {
    user: String,
}

impl Record for Session {
    fn declare(schema: &mut Schema<Self>) {
        schema.init(|session: Ptr<Session>, id: Ptr<Id>| {
            session.borrow_mut().user = format!("user-{}", id.borrow());
        });
    }
}

#[test]
fn initializer_receives_the_owner_id() -> Result<(), BoxError> {
    let handler = Handler::new::<Post, _, _>(|session: Ptr<Session>, id: Ptr<Id>| {
        (session.borrow().user.clone(), id.borrow().to_string())
    })?;
    let registry = mapped(&blog(), "posts", &handler)?;

    let mut ids = IdMap::new();
    ids.insert::<Session>("7").insert::<Post>("3");
    let mut ctx = context(&registry, ids);
    assert_eq!(ctx.invoke(&handler)?, ("user-7".to_string(), "3".to_string()));

    // without identifiers, the empty id is used
    let mut ctx = context(&registry, IdMap::new());
    assert_eq!(ctx.invoke(&handler)?, ("user-".to_string(), String::new()));
    Ok(())
}

#[derive(Clone, Default)]
struct Counter {
    hits: u32,
}

impl Record for Counter {
    fn declare(schema: &mut Schema<Self>) {
        schema.init(|counter: Counter| Counter {
            hits: counter.hits + 1,
        });
    }
}

#[test]
fn initializer_replaces_the_value() -> Result<(), BoxError> {
    let handler = Handler::new::<Counter, _, _>(|counter: Ptr<Counter>, again: Counter| {
        (counter.borrow().hits, again.hits)
    })?;
    let registry = mapped(&Counter::default(), "", &handler)?;

    for _ in 0..2 {
        let mut ctx = context(&registry, IdMap::new());
        assert_eq!(ctx.invoke(&handler)?, (1, 1));
    }
    Ok(())
}

#[derive(Clone, Default)]
struct Config {
    prefix: String,
}

impl Record for Config {
    fn declare(schema: &mut Schema<Self>) {
        schema.init(|config: Ptr<Config>| config.borrow_mut().prefix = "v1".into());
    }
}

#[derive(Clone, Default)]
struct Greeting {
    text: String,
}

impl Record for Greeting {
    fn declare(schema: &mut Schema<Self>) {
        schema.init(|greeting: Ptr<Greeting>, config: Ptr<Config>| {
            greeting.borrow_mut().text = format!("{}/hello", config.borrow().prefix);
        });
    }
}

#[test]
fn dependencies_are_initialized_first() -> Result<(), BoxError> {
    let handler = Handler::new::<Blog, _, _>(|greeting: Ptr<Greeting>| greeting.borrow().text.clone())?;
    let registry = mapped(&blog(), "", &handler)?;
    assert!(registry.resolve(&Config::ty()).is_some());

    let mut ctx = context(&registry, IdMap::new());
    assert_eq!(ctx.invoke(&handler)?, "v1/hello");

    // request, response writer, then the dependencies in construction order
    let types: Vec<Ty> = ctx.values().iter().map(|value| value.ty().clone()).collect();
    assert_eq!(
        types,
        vec![
            Ty::ptr(request_type()),
            response_type(),
            Ty::ptr(Greeting::ty()),
            Ty::ptr(Config::ty()),
        ]
    );
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("the vault is locked")]
struct Locked;

#[derive(Clone, Default)]
struct Vault {
    open: bool,
}

impl Record for Vault {
    fn declare(schema: &mut Schema<Self>) {
        schema.init(|vault: Vault| -> Result<Vault, Locked> {
            if vault.open {
                Ok(vault)
            } else {
                Err(Locked)
            }
        });
    }
}

#[test]
fn initializer_errors_are_surfaced() -> Result<(), BoxError> {
    let handler = Handler::new::<Blog, _, _>(|vault: Ptr<Vault>| vault.borrow().open)?;
    let registry = mapped(&blog(), "", &handler)?;

    let mut ctx = context(&registry, IdMap::new());
    match ctx.invoke(&handler) {
        Err(ResolveError::Initializer { owner, source }) => {
            assert_eq!(owner, Ty::ptr(Vault::ty()));
            assert_eq!(source.to_string(), "the vault is locked");
        }
        _ => panic!("the initializer should fail"),
    }
    Ok(())
}

#[derive(Clone, Default)]
struct Settings {
    level: u8,
}

impl Record for Settings {}

#[test]
fn provided_values() -> Result<(), BoxError> {
    let handler = Handler::new::<Blog, _, _>(|settings: Settings| settings.level)?;
    let tree = ResourceTree::build(&blog())?;
    let registry = Registry::builder()
        .provide(Settings { level: 3 })?
        .index(&tree)?
        .handler(&tree, tree.root(), &handler)?
        .build();

    let mut ctx = context(&registry, IdMap::new());
    assert_eq!(ctx.invoke(&handler)?, 3);

    assert!(matches!(
        Registry::builder().provide(String::from("settings")),
        Err(BuildError::InvalidShape { .. })
    ));
    Ok(())
}

#[test]
fn unmapped_dependency() -> Result<(), BoxError> {
    let handler = Handler::new::<Blog, _, _>(|settings: Ptr<Settings>| settings.borrow().level)?;
    let tree = ResourceTree::build(&blog())?;
    let registry = Registry::builder().index(&tree)?.build();

    let mut ctx = context(&registry, IdMap::new());
    match ctx.invoke(&handler) {
        Err(ResolveError::Unmapped(ty)) => assert_eq!(ty, Ty::ptr(Settings::ty())),
        _ => panic!("settings were never mapped"),
    }
    Ok(())
}

#[test]
fn context_misuse() {
    match Handler::new::<Blog, _, _>(|_writer: Ptr<ResponseWriter>| ()) {
        Err(BuildError::ContextMisuse { asked, expected }) => {
            assert_eq!(asked, Ty::ptr(response_type()));
            assert_eq!(expected, response_type());
        }
        _ => panic!("the writer is not requested by pointer"),
    }
    assert!(matches!(
        Handler::new::<Blog, _, _>(|_request: Request| ()),
        Err(BuildError::ContextMisuse { .. })
    ));
    assert!(matches!(
        Handler::new::<Blog, _, _>(|_id: Id| ()),
        Err(BuildError::ContextMisuse { .. })
    ));
    assert!(matches!(
        Handler::new::<Blog, _, _>(|_title: String| ()),
        Err(BuildError::InvalidDependency(_))
    ));
}

#[test]
fn writer_and_request_are_injected() -> Result<(), BoxError> {
    let handler = Handler::new::<Blog, _, _>(|request: Ptr<Request>, writer: ResponseWriter| {
        writer.set_status(StatusCode::ACCEPTED);
        writer.write(request.borrow().uri().path().as_bytes());
    })?;
    let registry = mapped(&blog(), "", &handler)?;

    let writer = ResponseWriter::new();
    let request = http::Request::builder()
        .uri("/blog/posts")
        .body(Vec::new())?;
    let mut ctx = Context::new(&registry, request, &writer, IdMap::new());
    ctx.invoke(&handler)?;

    let response = writer.take();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.body(), b"/blog/posts");
    Ok(())
}

#[derive(Clone, Default)]
struct Other;

impl Record for Other {}

#[derive(Clone, Default)]
struct Broken;

impl Record for Broken {
    fn declare(schema: &mut Schema<Self>) {
        schema.init(|_broken: Ptr<Broken>| Ptr::new(Other));
    }
}

#[derive(Clone, Default)]
struct Orphan;

impl Record for Orphan {
    fn declare(schema: &mut Schema<Self>) {
        schema.init(|_other: Ptr<Other>| ());
    }
}

#[test]
fn invalid_initializers() -> Result<(), BuildError> {
    let tree = ResourceTree::build(&Broken)?;
    match Registry::builder().index(&tree) {
        Err(BuildError::InvalidInitializer { owner, output }) => {
            assert_eq!(owner, Ty::ptr(Broken::ty()));
            assert_eq!(output, Other::ty());
        }
        _ => panic!("an initializer can't output another type"),
    }

    let tree = ResourceTree::build(&Orphan)?;
    assert!(matches!(
        Registry::builder().index(&tree),
        Err(BuildError::MissingReceiver { .. })
    ));
    Ok(())
}

#[test]
fn concurrent_requests() -> Result<(), BoxError> {
    let handler = Handler::new::<Post, _, _>(|post: Ptr<Post>, id: Ptr<Id>| {
        post.borrow_mut().title.push_str(id.borrow().as_str());
        post.borrow().title.clone()
    })?;
    let registry = mapped(&blog(), "posts", &handler)?;

    std::thread::scope(|scope| {
        for n in 0..4 {
            let (registry, handler) = (&registry, &handler);
            scope.spawn(move || {
                let mut ids = IdMap::new();
                ids.insert::<Post>(n.to_string());
                let mut ctx = context(registry, ids);
                let title = ctx.invoke(handler).map_err(|err| err.to_string());
                assert_eq!(title, Ok(format!("first{}", n)));
            });
        }
    });
    Ok(())
}
