//! Ten connections shared by twelve callers: the last two wait until earlier callers release.

use std::sync::Arc;
use std::time::Duration;

use resource_pool::ResourcePool;

#[derive(Debug)]
struct Connection {
    url: String,
}

#[tokio::main]
async fn main() {
    let mut next_index = 0;
    let pool = Arc::new(ResourcePool::new(10, || {
        let url = format!("http://10.0.0.1/{next_index}");
        next_index += 1;
        Connection { url }
    }));

    let mut returning = Vec::new();

    // The first ten are checked out immediately.
    for _ in 0..10 {
        let connection = pool.acquire().await;
        println!("{connection:?}");

        if returning.len() < 2 {
            returning.push(connection);
        }
    }

    let releaser = tokio::spawn({
        let pool = Arc::clone(&pool);

        async move {
            for connection in returning {
                tokio::time::sleep(Duration::from_millis(500)).await;
                println!("releasing {}", connection.url);
                pool.release(connection).unwrap();
            }
        }
    });

    // These two wait in line for the releases above.
    for _ in 0..2 {
        let connection = pool.acquire().await;
        println!("{connection:?} (after waiting)");
    }

    releaser.await.unwrap();

    println!("{pool:?}");
}
