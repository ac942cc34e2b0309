use std::error::Error;

use http::StatusCode;
use rescope::*;
use tracing_subscriber::EnvFilter;

// Define records and declare the fields to map

#[derive(Clone, Default)]
struct Post {
    title: String,
    body: String,
}

impl Record for Post {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Title", |post| &post.title)
            .field("Body", |post| &post.body);
    }
}

trait Signer {
    fn sign(&self, text: &str) -> String;
}

#[derive(Clone, Default)]
struct Author {
    name: String,
}

impl Signer for Author {
    fn sign(&self, text: &str) -> String {
        format!("{}\n    -- {}", text, self.name)
    }
}

impl Record for Author {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Name", |author| &author.name)
            .implements::<dyn Signer>(|author| author);
    }
}

#[derive(Clone, Default)]
struct Blog {
    author: Author,
    posts: Vec<Post>,
}

impl Record for Blog {
    fn declare(schema: &mut Schema<Self>) {
        schema
            .field("Author", |blog| &blog.author)
            .field("Posts", |blog| &blog.posts);
    }
}

// A request-scoped dependency, filled by its initializer

#[derive(Clone, Default)]
struct Visitor {
    name: String,
}

impl Record for Visitor {
    fn declare(schema: &mut Schema<Self>) {
        schema.init(|visitor: Ptr<Visitor>, request: Ptr<Request>| {
            let name = request
                .borrow()
                .headers()
                .get("x-visitor")
                .and_then(|name| name.to_str().ok())
                .unwrap_or("stranger")
                .to_string();
            visitor.borrow_mut().name = name;
        });
    }
}

// Handlers are plain functions

fn list(blog: Ptr<Blog>, visitor: Ptr<Visitor>, writer: ResponseWriter) {
    writer.write(format!("Hello {}\n", visitor.borrow().name).as_bytes());
    for (idx, post) in blog.borrow().posts.iter().enumerate() {
        writer.write(format!("  {}. {}\n", idx, post.title).as_bytes());
    }
}

fn show(blog: Ptr<Blog>, id: Ptr<Id>, signer: Iface<dyn Signer>, writer: ResponseWriter) {
    let blog = blog.borrow();
    let post = id.borrow().parse::<usize>().ok().and_then(|idx| blog.posts.get(idx));
    match post {
        Some(post) => {
            let text = format!("# {}\n{}\n", post.title, post.body);
            writer.write(signer.borrow().sign(&text).as_bytes());
        }
        None => writer.set_status(StatusCode::NOT_FOUND),
    }
}

/// Stand-in for the transport: create the context of one request and answer it
fn serve(registry: &Registry, handler: &Handler<()>, request: Request, ids: IdMap) {
    let path = request.uri().path().to_string();
    let writer = ResponseWriter::new();
    let mut ctx = Context::new(registry, request, &writer, ids);
    if let Err(err) = ctx.invoke(handler) {
        writer.set_status(err.status());
        writer.write(err.to_string().as_bytes());
    }

    let response = writer.take();
    println!("GET {} -> {}", path, response.status());
    println!("{}", String::from_utf8_lossy(response.body()));
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let blog = Blog {
        author: Author {
            name: "Ferris".into(),
        },
        posts: vec![
            Post {
                title: "Hello".into(),
                body: "First post".into(),
            },
            Post {
                title: "Again".into(),
                body: "Second post".into(),
            },
        ],
    };

    // Map the resources, the handlers and their dependencies once
    let tree = ResourceTree::build(&blog)?;
    println!("{}", tree);

    let posts = tree.find("posts").ok_or("missing posts resource")?;
    let list = Handler::new::<Blog, _, _>(list)?;
    let show = Handler::new::<Post, _, _>(show)?;
    let registry = Registry::builder()
        .index(&tree)?
        .handler(&tree, tree.root(), &list)?
        .handler(&tree, posts, &show)?
        .build();

    // Then answer requests
    let request = http::Request::builder()
        .uri("/blog")
        .header("x-visitor", "Ada")
        .body(Vec::new())?;
    serve(&registry, &list, request, IdMap::new());

    for id in ["1", "7"] {
        let request = http::Request::builder()
            .uri(format!("/blog/posts/{}", id))
            .body(Vec::new())?;
        let mut ids = IdMap::new();
        ids.insert::<Post>(id);
        serve(&registry, &show, request, ids);
    }

    Ok(())
}
