/// The search page served at the server root. The inline script is the whole
/// browser side of the engine: it intercepts the form submission, queries
/// `api/search` and rewrites the result list with either the hits, a no-match
/// notice or a generic error notice. Responses overtaken by a newer
/// submission are dropped.
pub const SEARCH_PAGE: &str = r"
<!doctype html>
<html>
  <head>
    <title>Concord</title>
    <meta charset='utf-8' />
  </head>
  <body>
    <h1>Type a query to search</h1>
    <form id='query'>
      <input type='text' id='q' value='' />
      <input type='submit' value='Search' />
    </form>
    <ul id='result'></ul>

    <script>
      (function () {
        var seq = 0;
        var applied = 0;

        function render(token, items) {
          if (token < applied) {
            return;
          }
          applied = token;

          var result = document.getElementById('result');
          result.innerHTML = '';
          items.forEach(function (item) {
            var li = document.createElement('li');
            li.textContent = item;
            result.appendChild(li);
          });
        }

        document.getElementById('query').addEventListener('submit', function (e) {
          e.preventDefault();
          var token = ++seq;
          var q = document.getElementById('q').value;

          fetch('api/search?q=' + encodeURIComponent(q))
            .then(function (response) {
              if (!response.ok) {
                throw new Error('status ' + response.status);
              }
              return response.json();
            })
            .then(function (data) {
              if (!data || !data.length) {
                render(token, ['No match is found.']);
              } else {
                data.forEach(function (hit) {
                  console.log(hit);
                });
                render(token, data);
              }
            })
            .catch(function () {
              render(token, ['Internal error captured and will be fixed soon.']);
            });
        });
      })();
    </script>
  </body>
</html>
";
