mod fetch_client;
